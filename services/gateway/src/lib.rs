pub mod api;
pub mod config;
pub mod mock;
pub mod pipeline;
pub mod policy;
pub mod routes;
pub mod schema;

pub use api::{create_router, AppState, ErrorResponse};
pub use config::GatewayConfig;
pub use mock::{MockResponder, ProducerError, ResponseProducer};
pub use pipeline::{
    Pipeline, PipelineError, PipelineInput, PipelineOptions, PipelineResponse, Stage,
};
pub use policy::{PolicyEngine, PolicyError, PolicyFault, PolicyOutcome};
pub use routes::{RouteDefinition, RouteError, RouteMethod, RouteRegistry};
pub use schema::{SchemaDoc, SchemaError, ValidationOutcome};
