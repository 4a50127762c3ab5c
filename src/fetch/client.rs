use async_trait::async_trait;
use reqwest::{Request, Response};

/// Executes prepared requests. Every source adapter and the schedule
/// download go through this trait, so credentials can be layered on by
/// wrapping (see [`crate::fetch::auth::UrlParam`]).
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}

#[async_trait]
impl<C: HttpClient + ?Sized> HttpClient for std::sync::Arc<C> {
    async fn execute(&self, req: Request) -> reqwest::Result<Response> {
        (**self).execute(req).await
    }
}
