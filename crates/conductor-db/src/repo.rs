//! Repository traits and PostgreSQL implementations.

pub mod analysis;
pub mod config;
pub mod external_file;
pub mod notification;
pub mod operation;
pub mod pipeline;

pub use analysis::{
    AnalysisRecord, AnalysisRepo, NewAnalysis, PgAnalysisRepo, QualityGateSummary, QualityTrendPoint,
};
pub use config::{ConfigRepo, PgConfigRepo};
pub use external_file::{
    ExternalFileRecord, ExternalFileRepo, FileUpdate, NewExternalFile, PgExternalFileRepo,
};
pub use notification::{NewNotification, NotificationRecord, NotificationRepo, PgNotificationRepo};
pub use operation::{
    MetricQuery, MetricRecord, MetricSample, NewOperation, OperationRecord, OperationRepo, PgOperationRepo,
};
pub use pipeline::{NewPipeline, PgPipelineRepo, PipelineRecord, PipelineRepo, PipelineStatistics};
