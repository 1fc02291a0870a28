pub mod config;
pub mod error;
pub mod media;
pub mod protocol;
pub mod publisher;
pub mod session;
pub mod transport;
pub mod url;

pub use config::PublisherConfig;
pub use error::{Result, RtspError};
pub use media::h264::{H264Packetizer, SharedPacketizer};
pub use media::{AccessUnit, ParameterSets};
pub use protocol::Credentials;
pub use publisher::{Publisher, SessionEvent};
pub use session::{RtspSession, SessionState};
pub use transport::{PacketRing, RingConfig};
pub use url::RtspUrl;
