//! Request-facing LogService handlers.
//!
//! Handlers are never gated on leadership: every instance accepts pushes
//! and serves pulls, and ordering is enforced by the store transaction.

use autometrics::autometrics;
use tonic::Request;
use tonic::Response;
use tonic::Status;
use tracing::debug;
use tracing::warn;

use crate::metrics::PULLED_RECORDS_METRIC;
use crate::proto::log::log_service_server::LogService;
use crate::proto::log::LogRecord as ProtoLogRecord;
use crate::proto::log::PullLogsRequest;
use crate::proto::log::PullLogsResponse;
use crate::proto::log::PushLogsRequest;
use crate::proto::log::PushLogsResponse;
use crate::proto::log::ScoutLogsRequest;
use crate::proto::log::ScoutLogsResponse;
use crate::Error;
use crate::LogError;
use crate::Node;
use crate::API_SLO;

#[tonic::async_trait]
impl LogService for Node {
    /// Appends every record of the request as one contiguous offset run.
    #[cfg_attr(not(doc), autometrics(objective = API_SLO))]
    #[tracing::instrument(skip(self, request))]
    async fn push_logs(
        &self,
        request: Request<PushLogsRequest>,
    ) -> std::result::Result<Response<PushLogsResponse>, Status> {
        if !self.server_is_ready() {
            warn!("[rpc|push_logs] {} is not ready!", self.instance_id);
            return Err(Status::unavailable("Service is not ready"));
        }

        let PushLogsRequest { collection_id, records } = request.into_inner();
        if records.is_empty() {
            return Err(Status::invalid_argument("records must not be empty"));
        }
        debug!("push {} records to {}", records.len(), collection_id);

        let payloads = records.into_iter().map(|r| r.payload).collect();
        let offsets = self.repository.append_batch(&collection_id, payloads).await?;
        Ok(Response::new(PushLogsResponse { offsets }))
    }

    /// Reads retained records from `start_from_offset`, at most `batch_size`
    /// of them (capped by `network.max_pull_batch_size`).
    #[cfg_attr(not(doc), autometrics(objective = API_SLO))]
    #[tracing::instrument(skip(self, request))]
    async fn pull_logs(
        &self,
        request: Request<PullLogsRequest>,
    ) -> std::result::Result<Response<PullLogsResponse>, Status> {
        if !self.server_is_ready() {
            warn!("[rpc|pull_logs] {} is not ready!", self.instance_id);
            return Err(Status::unavailable("Service is not ready"));
        }

        let PullLogsRequest {
            collection_id,
            start_from_offset,
            batch_size,
        } = request.into_inner();
        if batch_size < 0 {
            return Err(Error::from(LogError::InvalidArgument(format!("batch_size must be >= 0, got {batch_size}"))).into());
        }
        let limit = (batch_size as usize).min(self.config.network.max_pull_batch_size);

        let records = self
            .repository
            .read(&collection_id, start_from_offset, limit)
            .await?;

        PULLED_RECORDS_METRIC
            .with_label_values(&[&collection_id])
            .inc_by(records.len() as u64);

        Ok(Response::new(PullLogsResponse {
            records: records
                .into_iter()
                .map(|r| ProtoLogRecord {
                    log_offset: r.offset,
                    payload: r.payload,
                    enqueued_at_ms: r.enqueued_at_ms,
                })
                .collect(),
        }))
    }

    /// Reports the retained offset window without reading any record.
    #[cfg_attr(not(doc), autometrics(objective = API_SLO))]
    #[tracing::instrument(skip(self, request))]
    async fn scout_logs(
        &self,
        request: Request<ScoutLogsRequest>,
    ) -> std::result::Result<Response<ScoutLogsResponse>, Status> {
        if !self.server_is_ready() {
            warn!("[rpc|scout_logs] {} is not ready!", self.instance_id);
            return Err(Status::unavailable("Service is not ready"));
        }

        let collection_id = request.into_inner().collection_id;
        let stats = self.repository.stats(&collection_id).await?;
        Ok(Response::new(ScoutLogsResponse {
            first_offset: stats.tail_offset,
            first_uninserted_offset: stats.next_offset(),
        }))
    }
}
