pub mod counting;
pub mod error;
pub mod fingerprint;
pub mod formatter;
pub mod json;
pub mod keys;
pub mod record;
pub mod severity;
pub mod template;
pub mod value;

pub mod env;
pub mod init;
pub mod layer;
pub mod noop_sink;
pub mod output;
pub mod sink;
pub mod stream_sink;

pub use error::FormatError;
pub use formatter::{FormatOutcome, FormatterConfig, ServiceContext, StackdriverFormatter};
pub use keys::HttpRequest;
pub use record::{Level, LogEvent, SourceLocation};
pub use template::MessageTemplate;
pub use value::{Properties, PropertyValue, Scalar};
