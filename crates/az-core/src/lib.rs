mod archive;
pub mod association;
pub mod bundler;
pub mod entry;
pub mod error;
pub mod form;
pub mod model_bundle;
pub mod output_path;
pub mod packager;
pub mod path_matcher;
pub mod results;
pub mod submission;

pub use archive::{read_archive, write_archive};
pub use association::{AssociatedBatch, AssociatedPair, AssociationOptions};
pub use entry::{InputEntry, ModelFileEntry};
pub use error::{BundleError, CoreError, FieldErrors};
pub use form::{CustomModel, CustomPipeline, FormConfiguration, ModelSelection};
pub use model_bundle::{AllowedExtensions, ModelBundle};
pub use packager::ModelUpload;
pub use results::{AnalysisResult, ImageMetrics, ResultSet};
pub use submission::{FieldValue, FormField, SubmissionBody};
