//! StrokeSync Core Library
//!
//! Stroke model, history engine and wire protocol for the StrokeSync
//! collaborative drawing surface.

pub mod debounce;
pub mod history;
pub mod peers;
pub mod presence;
pub mod protocol;
pub mod render;
pub mod repository;
pub mod simplify;
pub mod stroke;
pub mod sync;

pub use debounce::{DEFAULT_DEBOUNCE, Debounce};
pub use history::{DrawState, HistoryConfig, HistoryEvent, HistoryManager, Pen, PointerInput, RedoMode};
pub use peers::PeerDrawingIndex;
pub use presence::{PresenceEntry, PresenceRoster, PresenceState};
pub use protocol::{ClientMessage, ProtocolError, ServerMessage};
pub use render::{PaintedStroke, PathHandle, RenderBinding, Surface};
pub use repository::{DrawingRepository, FileRepository, MemoryRepository, RepositoryError, RepositoryResult};
pub use simplify::{DEFAULT_TOLERANCE, simplify, simplify_group};
pub use stroke::{AuthorId, GroupId, Phase, StrokeGroup, StrokePoint};
pub use sync::{ChannelClient, ChannelError, ChannelEvent, ConnectionState};
