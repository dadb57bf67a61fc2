pub mod engine;
pub mod provider;
pub mod types;

pub use engine::classify;
pub use provider::{AnalysisProvider, HttpAnalysisProvider, build_classification_prompt};
pub use types::{
    AiAnalysis, AnalysisRequest, ChangeCategory, ChangesetContext, Classification,
    LoginFlowDescriptor, Priority, RouteRecommendation, RouteSuggestion, VisualChange,
    WaitStrategy,
};
