pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid selector {selector:?}: {message}")]
	Selector { selector: &'static str, message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
}
impl From<herald_providers::Error> for Error {
	fn from(err: herald_providers::Error) -> Self {
		Self::Provider { message: err.to_string() }
	}
}
