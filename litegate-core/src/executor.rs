//! Query executor
//!
//! Gates a [`Request`] through the validator, runs it against the shared
//! store in one locked cycle and turns the outcome into a [`Response`].

use crate::protocol::{Request, Response};
use crate::store::{PermissionStore, SharedStore};
use crate::validator::validate;

/// Executes one request
///
/// Never fails: rejections and store errors become [`Response::Error`].
pub async fn execute<S: PermissionStore>(store: &SharedStore<S>, request: Request) -> Response {
    if let Err(e) = validate(&request.statement).into_result() {
        #[cfg(feature = "tracing")]
        tracing::warn!("Rejected statement: {}", request.statement);
        return e.into();
    }

    let Request {
        statement,
        positional_args,
        keyword_args,
    } = request;

    let result = store
        .with(move |store| store.execute(&statement, &positional_args, &keyword_args))
        .await;

    match result {
        Ok(rows) => {
            #[cfg(feature = "tracing")]
            tracing::debug!("Statement returned {} rows", rows.len());
            Response::Rows(rows)
        }
        Err(e) => {
            #[cfg(feature = "tracing")]
            tracing::debug!("Statement failed: {}", e);
            e.into()
        }
    }
}
