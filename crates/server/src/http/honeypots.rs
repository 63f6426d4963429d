use super::*;

pub fn router() -> Router<AppState> {
    Router::<AppState>::new()
        .route(
            "/api/v1/honeypots",
            get(list_honeypots).post(create_honeypot),
        )
        .route(
            "/api/v1/honeypots/{honeypot_id}",
            get(get_honeypot)
                .put(update_honeypot)
                .delete(delete_honeypot),
        )
}

#[utoipa::path(
    post,
    path = "/api/v1/honeypots",
    request_body = CreateHoneypotRequest,
    responses(
        (status = 201, description = "Honeypot provisioned", body = HoneypotResponse),
        (status = 400, description = "Invalid request", body = api::ErrorResponse),
        (status = 409, description = "Requested host port already allocated", body = api::ErrorResponse),
        (status = 500, description = "Provisioning failed", body = api::ErrorResponse),
        (status = 503, description = "Container runtime unavailable", body = api::ErrorResponse)
    ),
    tag = "honeypots"
)]
pub(crate) async fn create_honeypot(
    State(state): State<AppState>,
    Json(req): Json<CreateHoneypotRequest>,
) -> ApiResult<(StatusCode, Json<HoneypotResponse>)> {
    let honeypot = services::honeypots::provision_honeypot(&state, req).await?;
    Ok((StatusCode::CREATED, Json(honeypot)))
}

#[utoipa::path(
    get,
    path = "/api/v1/honeypots",
    responses((status = 200, description = "All honeypots", body = [HoneypotResponse])),
    tag = "honeypots"
)]
pub(crate) async fn list_honeypots(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<HoneypotResponse>>> {
    let honeypots = services::honeypots::list_honeypots(&state).await?;
    Ok(Json(honeypots))
}

#[utoipa::path(
    get,
    path = "/api/v1/honeypots/{honeypot_id}",
    params(("honeypot_id" = i64, Path, description = "Honeypot id")),
    responses(
        (status = 200, description = "Honeypot detail", body = HoneypotResponse),
        (status = 404, description = "No such honeypot", body = api::ErrorResponse)
    ),
    tag = "honeypots"
)]
pub(crate) async fn get_honeypot(
    State(state): State<AppState>,
    Path(honeypot_id): Path<i64>,
) -> ApiResult<Json<HoneypotResponse>> {
    let honeypot = services::honeypots::get_honeypot(&state, honeypot_id).await?;
    Ok(Json(honeypot))
}

#[utoipa::path(
    put,
    path = "/api/v1/honeypots/{honeypot_id}",
    params(("honeypot_id" = i64, Path, description = "Honeypot id")),
    request_body = UpdateHoneypotRequest,
    responses(
        (status = 200, description = "Updated honeypot", body = HoneypotResponse),
        (status = 400, description = "Invalid request", body = api::ErrorResponse),
        (status = 404, description = "No such honeypot", body = api::ErrorResponse)
    ),
    tag = "honeypots"
)]
pub(crate) async fn update_honeypot(
    State(state): State<AppState>,
    Path(honeypot_id): Path<i64>,
    Json(req): Json<UpdateHoneypotRequest>,
) -> ApiResult<Json<HoneypotResponse>> {
    let honeypot = services::honeypots::update_honeypot(&state, honeypot_id, req).await?;
    Ok(Json(honeypot))
}

#[utoipa::path(
    delete,
    path = "/api/v1/honeypots/{honeypot_id}",
    params(("honeypot_id" = i64, Path, description = "Honeypot id")),
    responses(
        (status = 200, description = "Honeypot deleted", body = DeleteHoneypotResponse),
        (status = 404, description = "No such honeypot", body = api::ErrorResponse)
    ),
    tag = "honeypots"
)]
pub(crate) async fn delete_honeypot(
    State(state): State<AppState>,
    Path(honeypot_id): Path<i64>,
) -> ApiResult<Json<DeleteHoneypotResponse>> {
    let result = services::honeypots::delete_honeypot(&state, honeypot_id).await?;
    Ok(Json(result))
}
