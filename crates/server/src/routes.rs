pub use crate::http::ApiDoc;
pub use crate::http::build_router;
