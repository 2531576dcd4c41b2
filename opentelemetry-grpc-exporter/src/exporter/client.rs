use core::fmt;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use opentelemetry::{otel_debug, otel_warn};
use opentelemetry_proto::tonic::collector::logs::v1::{
    logs_service_client::LogsServiceClient, ExportLogsServiceRequest, ExportLogsServiceResponse,
};
use opentelemetry_sdk::error::{OTelSdkError, OTelSdkResult};
use tonic::{service::Interceptor, transport::Channel, Code, Request, Response, Status};

use super::BoxInterceptor;
use crate::proto::jaeger_api_v2::{
    collector_service_client::CollectorServiceClient, PostSpansRequest, PostSpansResponse,
};

/// A generated gRPC client seen as a single unary export call.
pub(crate) trait ExportStub: Clone + Send + 'static {
    type Request: Send + 'static;
    type Response: Send + 'static;

    /// Name used in diagnostics.
    const NAME: &'static str;

    fn call(
        &mut self,
        request: Request<Self::Request>,
    ) -> impl Future<Output = Result<Response<Self::Response>, Status>> + Send;

    /// Look at a successful response. Nothing in it can fail the export.
    fn inspect(_response: &Self::Response) {}
}

impl ExportStub for CollectorServiceClient<Channel> {
    type Request = PostSpansRequest;
    type Response = PostSpansResponse;

    const NAME: &'static str = "JaegerExporter";

    async fn call(
        &mut self,
        request: Request<PostSpansRequest>,
    ) -> Result<Response<PostSpansResponse>, Status> {
        self.post_spans(request).await
    }
}

impl ExportStub for LogsServiceClient<Channel> {
    type Request = ExportLogsServiceRequest;
    type Response = ExportLogsServiceResponse;

    const NAME: &'static str = "LogExporter";

    async fn call(
        &mut self,
        request: Request<ExportLogsServiceRequest>,
    ) -> Result<Response<ExportLogsServiceResponse>, Status> {
        self.export(request).await
    }

    // Partial success is logged, never retried.
    fn inspect(response: &ExportLogsServiceResponse) {
        if let Some(partial_success) = &response.partial_success {
            if partial_success.rejected_log_records > 0
                || !partial_success.error_message.is_empty()
            {
                otel_warn!(
                    name: "LogExporter.PartialSuccess",
                    rejected_log_records = partial_success.rejected_log_records,
                    error_message = partial_success.error_message.as_str(),
                );
            }
        }
    }
}

/// Owns a stub and performs one RPC per non-empty export.
pub(crate) struct ExportClient<S> {
    inner: Mutex<Option<ClientInner<S>>>,
    timeout: Duration,
}

struct ClientInner<S> {
    stub: S,
    interceptor: BoxInterceptor,
}

impl<S: ExportStub> fmt::Debug for ExportClient<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportClient")
            .field("stub", &S::NAME)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl<S: ExportStub> ExportClient<S> {
    pub(crate) fn new(stub: S, interceptor: BoxInterceptor, timeout: Duration) -> Self {
        otel_debug!(
            name: "GrpcExporter.ClientBuilt",
            exporter = S::NAME,
            timeout_in_millisecs = timeout.as_millis()
        );

        ExportClient {
            inner: Mutex::new(Some(ClientInner { stub, interceptor })),
            timeout,
        }
    }

    /// Export `record_count` records. `encode` builds the request and is only
    /// invoked when there is something to send.
    pub(crate) async fn export<F>(&self, record_count: usize, encode: F) -> OTelSdkResult
    where
        F: FnOnce() -> S::Request + Send,
    {
        if record_count == 0 {
            return Ok(());
        }

        let (mut stub, metadata, extensions) = match self
            .inner
            .lock()
            .map_err(|e| OTelSdkError::InternalFailure(format!("Failed to acquire lock: {e:?}")))?
            .as_mut()
        {
            Some(inner) => {
                let (m, e, _) = inner
                    .interceptor
                    .call(Request::new(()))
                    .map_err(|status| {
                        otel_warn!(
                            name: "GrpcExporter.InterceptorFailed",
                            exporter = S::NAME,
                            grpc_code = format!("{:?}", status.code())
                        );
                        // grpc_message may carry credentials, keep it at debug level.
                        otel_debug!(
                            name: "GrpcExporter.InterceptorFailedDetails",
                            grpc_message = status.message()
                        );
                        OTelSdkError::InternalFailure(format!(
                            "{} export failed in interceptor with gRPC code: {:?}",
                            S::NAME,
                            status.code()
                        ))
                    })?
                    .into_parts();
                (inner.stub.clone(), m, e)
            }
            None => return Err(OTelSdkError::AlreadyShutdown),
        };

        let mut request = Request::from_parts(metadata, extensions, encode());
        request.set_timeout(self.timeout);

        otel_debug!(
            name: "GrpcExporter.ExportStarted",
            exporter = S::NAME,
            record_count = record_count
        );

        match stub.call(request).await {
            Ok(response) => {
                otel_debug!(name: "GrpcExporter.ExportSucceeded", exporter = S::NAME);
                S::inspect(response.get_ref());
                Ok(())
            }
            Err(status) => Err(self.failure(status)),
        }
    }

    fn failure(&self, status: Status) -> OTelSdkError {
        let code = status.code();
        // Connection problems come with actionable messages. Other codes, auth
        // failures in particular, may echo sensitive data.
        let is_connection_error = matches!(
            code,
            Code::Unavailable
                | Code::Unknown
                | Code::DeadlineExceeded
                | Code::ResourceExhausted
                | Code::Aborted
                | Code::Cancelled
        );

        if is_connection_error {
            otel_warn!(
                name: "GrpcExporter.ExportFailed",
                exporter = S::NAME,
                grpc_code = format!("{:?}", code),
                grpc_message = status.message()
            );
        } else {
            otel_warn!(
                name: "GrpcExporter.ExportFailed",
                exporter = S::NAME,
                grpc_code = format!("{:?}", code)
            );
            otel_debug!(
                name: "GrpcExporter.ExportFailedDetails",
                grpc_message = status.message(),
                grpc_details = format!("{:?}", status.details())
            );
        }

        match code {
            Code::DeadlineExceeded => OTelSdkError::Timeout(self.timeout),
            _ => OTelSdkError::InternalFailure(format!(
                "{} export failed with gRPC code: {:?}",
                S::NAME,
                code
            )),
        }
    }

    /// Release the stub. Calling this more than once is fine.
    pub(crate) fn shutdown(&self) -> OTelSdkResult {
        self.inner
            .lock()
            .map_err(|e| OTelSdkError::InternalFailure(format!("Failed to acquire lock: {e}")))?
            .take();

        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use tonic::metadata::MetadataValue;

    /// Stub answering every call with a fixed outcome and counting the calls.
    #[derive(Clone, Debug, Default)]
    pub(crate) struct MockStub {
        pub(crate) calls: Arc<AtomicUsize>,
        pub(crate) failure: Option<Code>,
        pub(crate) last_metadata: Arc<Mutex<Option<tonic::metadata::MetadataMap>>>,
    }

    impl MockStub {
        pub(crate) fn failing(code: Code) -> Self {
            MockStub {
                failure: Some(code),
                ..Default::default()
            }
        }

        pub(crate) fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ExportStub for MockStub {
        type Request = Vec<u32>;
        type Response = ();

        const NAME: &'static str = "MockExporter";

        async fn call(&mut self, request: Request<Vec<u32>>) -> Result<Response<()>, Status> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_metadata.lock().unwrap() = Some(request.metadata().clone());
            match self.failure {
                Some(code) => Err(Status::new(code, "mock failure")),
                None => Ok(Response::new(())),
            }
        }
    }

    pub(crate) fn passthrough() -> BoxInterceptor {
        BoxInterceptor(Box::new(|req: Request<()>| Ok::<_, Status>(req)))
    }

    fn client(stub: &MockStub) -> ExportClient<MockStub> {
        ExportClient::new(stub.clone(), passthrough(), Duration::from_secs(3))
    }

    #[tokio::test]
    async fn empty_batch_performs_no_call() {
        let stub = MockStub::default();
        let client = client(&stub);
        let encoded = AtomicBool::new(false);

        let result = client
            .export(0, || {
                encoded.store(true, Ordering::SeqCst);
                Vec::new()
            })
            .await;

        assert!(result.is_ok());
        assert_eq!(stub.call_count(), 0);
        assert!(!encoded.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn one_call_per_export() {
        let stub = MockStub::default();
        let client = client(&stub);

        assert!(client.export(2, || vec![1, 2]).await.is_ok());
        assert!(client.export(1, || vec![3]).await.is_ok());

        assert_eq!(stub.call_count(), 2);
    }

    #[tokio::test]
    async fn request_carries_timeout_and_metadata() {
        let stub = MockStub::default();
        let interceptor = BoxInterceptor(Box::new(|mut req: Request<()>| {
            req.metadata_mut()
                .insert("x-tenant", MetadataValue::from_static("blue"));
            Ok::<_, Status>(req)
        }));
        let client = ExportClient::new(stub.clone(), interceptor, Duration::from_secs(3));

        client.export(1, || vec![7]).await.unwrap();

        let metadata = stub.last_metadata.lock().unwrap().clone().unwrap();
        assert_eq!(metadata.get("x-tenant").unwrap(), "blue");
        assert!(metadata.get("grpc-timeout").is_some());
    }

    #[tokio::test]
    async fn interceptor_failure_skips_the_call() {
        let stub = MockStub::default();
        let interceptor = BoxInterceptor(Box::new(|_req: Request<()>| {
            Err::<Request<()>, _>(Status::unauthenticated("token expired"))
        }));
        let client = ExportClient::new(stub.clone(), interceptor, Duration::from_secs(3));

        let result = client.export(1, || vec![1]).await;

        assert!(matches!(result, Err(OTelSdkError::InternalFailure(_))));
        assert_eq!(stub.call_count(), 0);
    }

    #[tokio::test]
    async fn deadline_exceeded_is_a_timeout() {
        let stub = MockStub::failing(Code::DeadlineExceeded);
        let client = client(&stub);

        let result = client.export(1, || vec![1]).await;

        assert!(matches!(
            result,
            Err(OTelSdkError::Timeout(timeout)) if timeout == Duration::from_secs(3)
        ));
        assert_eq!(stub.call_count(), 1);
    }

    #[tokio::test]
    async fn transport_errors_become_failures() {
        for code in [Code::Unavailable, Code::PermissionDenied, Code::Internal] {
            let stub = MockStub::failing(code);
            let client = client(&stub);

            let result = client.export(1, || vec![1]).await;

            match result {
                Err(OTelSdkError::InternalFailure(message)) => {
                    assert!(message.contains(&format!("{code:?}")), "{message}")
                }
                other => panic!("expected failure for {code:?}, got {other:?}"),
            }
            // no retries
            assert_eq!(stub.call_count(), 1);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_exports_share_one_stub() {
        const EXPORTS: usize = 32;
        let stub = MockStub::default();
        let client = Arc::new(client(&stub));

        let handles: Vec<_> = (0..EXPORTS)
            .map(|i| {
                let client = Arc::clone(&client);
                tokio::spawn(async move { client.export(1, move || vec![i as u32]).await })
            })
            .collect();

        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        assert_eq!(stub.call_count(), EXPORTS);
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let stub = MockStub::default();
        let client = client(&stub);

        assert!(client.shutdown().is_ok());
        assert!(client.shutdown().is_ok());

        let result = client.export(1, || vec![1]).await;
        assert!(matches!(result, Err(OTelSdkError::AlreadyShutdown)));
        // an empty batch never reaches the stub, shut down or not
        assert!(client.export(0, Vec::new).await.is_ok());
        assert_eq!(stub.call_count(), 0);
    }
}
