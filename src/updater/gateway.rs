//! Presentation-side collaborators: where status events go and where consent comes from.
//!
//! Both are called while the controller holds its state lock, so implementations
//! must hand the value off (channel, UI queue) and never call back into the
//! controller synchronously.

use futures::channel::mpsc::UnboundedSender;

use crate::state::events::StatusEvent;

use super::types::ConsentRequest;

/// Receives ordered status and progress events for display.
pub trait StatusSink: Send + Sync {
    fn emit(&self, event: StatusEvent);
}

/// Renders a yes/no prompt. The answer comes back later through
/// `UpdateController::respond`, possibly never.
pub trait ConsentGateway: Send + Sync {
    fn request(&self, request: ConsentRequest);
}

impl StatusSink for UnboundedSender<StatusEvent> {
    fn emit(&self, event: StatusEvent) {
        if self.unbounded_send(event).is_err() {
            log::debug!("Status receiver dropped, event discarded");
        }
    }
}

impl ConsentGateway for UnboundedSender<ConsentRequest> {
    fn request(&self, request: ConsentRequest) {
        if self.unbounded_send(request).is_err() {
            log::warn!("Consent receiver dropped, prompt not shown");
        }
    }
}

