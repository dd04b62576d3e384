//! Capability the engine consumes from the booking portal.
//!
//! A driver owns one private browser session. Only `open_event_list` loads
//! the event list. From then on the draw and queue observers
//! (`is_draw_open`, `queue_status`, `draw_countdown`, `is_tee_sheet_visible`)
//! must not reload the page; `refresh_tee_sheet` is only called once the
//! tee sheet is up.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;
use crate::types::{
    Confirmation, Identity, QueueStatus, RowAcquisition, RowRef, Suggestion, TeeRow,
};

#[async_trait]
pub trait PortalDriver: Send + Sync {
    async fn sign_in(&self, identity: &Identity) -> Result<()>;

    /// Navigate to the event list. Only called before the draw is entered.
    async fn open_event_list(&self) -> Result<()>;

    /// Is the entry affordance for the target day clickable? Passive: the
    /// page the agent is on is not reloaded.
    async fn is_draw_open(&self) -> Result<bool>;

    async fn enter_draw(&self) -> Result<()>;

    /// `None` until the portal has placed the agent in a queue.
    async fn queue_status(&self) -> Result<Option<QueueStatus>>;

    /// Time until the draw releases entrants, when the portal shows it.
    async fn draw_countdown(&self) -> Result<Option<Duration>> {
        Ok(None)
    }

    async fn is_tee_sheet_visible(&self) -> Result<bool>;

    /// Rows in display order.
    async fn scan_rows(&self) -> Result<Vec<TeeRow>>;

    /// Reload the tee sheet. Only valid once the tee sheet has been reached.
    async fn refresh_tee_sheet(&self) -> Result<()>;

    /// Invoke Book Group on `row`, re-checking that at least `min_seats`
    /// are still empty first.
    async fn click_book_group(&self, row: &RowRef, min_seats: u8) -> Result<RowAcquisition>;

    /// Answer "No" to the pre-set playing partners prompt.
    async fn decline_partner_prompt(&self) -> Result<()>;

    /// Type `member_number` into the next unused partner search input and
    /// wait for the first autocomplete suggestion.
    async fn submit_partner_search(&self, member_number: &str) -> Result<Option<Suggestion>>;

    /// Pick a suggestion. Returns the text the partner input now displays.
    async fn select_suggestion(&self, suggestion: &Suggestion) -> Result<String>;

    async fn confirm_booking(&self) -> Result<Confirmation>;

    /// Leave a reservation page without confirming.
    async fn abandon_booking(&self) -> Result<()>;

    /// PNG bytes of the current page, if the driver can capture one.
    async fn capture_screenshot(&self) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    /// Sign out and release the browser session.
    async fn close(&self) -> Result<()>;
}

/// Opens one private portal session per identity.
#[async_trait]
pub trait PortalFactory: Send + Sync {
    async fn open(&self, identity: &Identity) -> Result<Box<dyn PortalDriver>>;
}
