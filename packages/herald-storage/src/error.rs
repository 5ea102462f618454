#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Sqlx(#[from] sqlx::Error),
	#[error(transparent)]
	SerdeJson(#[from] serde_json::Error),
	#[error("Corrupt row: {0}")]
	Corrupt(String),
	#[error("Store unavailable: {0}")]
	Unavailable(String),
}
