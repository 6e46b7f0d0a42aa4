//! Model training: scaling, the forest classifier, evaluation

mod artifact;
pub mod forest;
pub mod metrics;
pub mod scaler;
mod trainer;

pub use artifact::{FeatureImportance, TrainedArtifact};
pub use forest::{ForestParams, RandomForest};
pub use metrics::{ClassMetrics, ClassificationReport};
pub use scaler::StandardScaler;
pub use trainer::{ClassDistribution, ModelTrainer, TrainerConfig, TrainingReport};
