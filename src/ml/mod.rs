//! Model validation
//!
//! Pluggable strategies ([`Classifier`], [`FeatureSelector`], [`Sampler`])
//! plugged into the [`WalkForwardValidator`], plus the experiment grid that
//! sweeps over them and the CSV report of the resulting folds. The
//! [`correlation`] module ranks features by their correlation with the label.

pub mod classifier;
pub mod correlation;
pub mod evaluation;
pub mod experiment;
pub mod report;
pub mod sampling;
pub mod selection;
pub mod validation;

pub use classifier::{classifier_by_name, Classifier, ClassifierError, Model};
pub use correlation::{correlate, FeatureCorrelation};
pub use evaluation::{npofb20, EvaluationMetrics};
pub use experiment::{Experiment, ExperimentError, ExperimentRow};
pub use sampling::{sampler_by_name, Sampler, SamplingError};
pub use selection::{selector_by_name, FeatureSelector, SelectionError};
pub use validation::{
    FoldOutcome, FoldResult, FoldSkip, ValidationError, ValidationRun, ValidationSettings,
    WalkForwardValidator,
};
