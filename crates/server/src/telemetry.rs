use metrics::counter;
use sqlx::Error as SqlxError;

pub(crate) fn record_internal_error_metrics(err: &anyhow::Error) {
    counter!("apiary_internal_errors_total").increment(1);
    if let Some(db_err) = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<SqlxError>())
    {
        let kind = match db_err {
            SqlxError::RowNotFound => "row_not_found",
            SqlxError::Database(_) => "database",
            SqlxError::Io(_) => "io",
            _ => "other",
        };
        counter!("apiary_db_errors_total", "kind" => kind).increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_internal_error_metrics_accepts_plain_errors() {
        record_internal_error_metrics(&anyhow::anyhow!("boom"));
    }

    #[test]
    fn record_internal_error_metrics_accepts_db_errors() {
        let err = anyhow::Error::from(SqlxError::RowNotFound).context("lookup failed");
        record_internal_error_metrics(&err);
    }
}
