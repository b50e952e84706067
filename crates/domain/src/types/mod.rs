//! Domain types and models

pub mod connection;
pub mod event;
pub mod oauth;
pub mod sync;

pub use connection::{
    CalendarConnection, CalendarProvider, ConnectionKey, ConnectionStatus, SyncSettings,
    SyncWindow, Version,
};
pub use event::{EventContent, MirroredEvent, RemoteEvent};
pub use oauth::{
    AuthorizationGrant, CalendarSelection, DiscoveredCalendar, OAuthSession, SessionPhase,
    TokenSet,
};
pub use sync::{ChangeNotification, IcsValidationResult, SyncOutcome};
