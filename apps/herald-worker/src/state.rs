use std::sync::Arc;

use herald_service::RunCoordinator;
use herald_storage::EventStore;

#[derive(Clone)]
pub struct AppState {
	pub coordinator: RunCoordinator,
}
impl AppState {
	pub fn new(coordinator: RunCoordinator) -> Self {
		Self { coordinator }
	}

	pub fn store(&self) -> &Arc<dyn EventStore> {
		self.coordinator.pipeline().store()
	}
}
