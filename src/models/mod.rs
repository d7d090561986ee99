// Domain models: samples, live station state, dashboard read model

mod dashboard;
mod live;
mod sample;
mod wire;

pub use dashboard::{
    AggregateSnapshot, ConnectionStatus, DashboardState, DashboardSummary, FetchStatus,
    MutationKind,
};
pub use live::{LiveStationState, StationReading};
pub use sample::{AudienceType, Sample};
pub use wire::RawAudienceRecord;
