use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;
use std::time::Instant;
use tracing::Instrument;

/// Request logging middleware
///
/// Opens a span per request carrying a request id, method and path, and logs
/// status and latency on completion. Headers and bodies are never recorded,
/// so bearer tokens and passwords stay out of the logs.
pub struct RequestLogger;

impl<S, B> Transform<S, ServiceRequest> for RequestLogger
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RequestLoggerService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(RequestLoggerService {
            service: Rc::new(service),
        }))
    }
}

pub struct RequestLoggerService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for RequestLoggerService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let start_time = Instant::now();
        let span = tracing::info_span!(
            "request",
            request_id = %uuid::Uuid::new_v4(),
            method = %req.method(),
            path = %req.path()
        );

        let service = self.service.clone();

        Box::pin(
            async move {
                let res = service.call(req).await?;
                let status = res.status();
                let elapsed_ms = start_time.elapsed().as_millis() as u64;

                if status.is_server_error() {
                    tracing::error!(status = status.as_u16(), elapsed_ms, "Request failed");
                } else {
                    tracing::info!(status = status.as_u16(), elapsed_ms, "Request completed");
                }

                Ok(res)
            }
            .instrument(span),
        )
    }
}
