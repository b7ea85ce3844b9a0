//! Signaling message types
//!
//! The protocol has exactly three messages. Each maps onto one [`Element`]:
//!
//! ```text
//! <Version DepthAlphaEnabled="0|1">{packed u32}</Version>
//! <Sdp Type="Offer|Answer">{sdp text}</Sdp>
//! <IceCandidate sdp-mid="{mid}" mline-index="{int}">{candidate}</IceCandidate>
//! ```

use crate::{Element, Error, ProtocolVersion, Result};
use std::fmt;

/// Element and attribute names used on the wire
pub mod tokens {
    pub const VERSION: &str = "Version";
    pub const DEPTH_ALPHA: &str = "DepthAlphaEnabled";

    pub const SDP: &str = "Sdp";
    pub const SDP_TYPE: &str = "Type";
    pub const SDP_TYPE_OFFER: &str = "Offer";
    pub const SDP_TYPE_ANSWER: &str = "Answer";

    pub const ICE_CANDIDATE: &str = "IceCandidate";
    pub const ICE_MID: &str = "sdp-mid";
    pub const ICE_MLINE_INDEX: &str = "mline-index";
}

/// All signaling messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Version(VersionMessage),
    SessionDescription(SessionDescription),
    IceCandidate(IceCandidate),
}

/// Handshake message, always the first one on a new connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionMessage {
    pub version: ProtocolVersion,
    pub depth_alpha_enabled: bool,
}

/// SDP role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SdpKind {
    Offer,
    Answer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    pub kind: SdpKind,
    pub sdp: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceCandidate {
    pub mid: String,
    pub mline_index: i32,
    pub candidate: String,
}

impl SdpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SdpKind::Offer => tokens::SDP_TYPE_OFFER,
            SdpKind::Answer => tokens::SDP_TYPE_ANSWER,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            tokens::SDP_TYPE_OFFER => Some(SdpKind::Offer),
            tokens::SDP_TYPE_ANSWER => Some(SdpKind::Answer),
            _ => None,
        }
    }
}

impl fmt::Display for SdpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Message {
    pub fn version(version: ProtocolVersion, depth_alpha_enabled: bool) -> Self {
        Message::Version(VersionMessage {
            version,
            depth_alpha_enabled,
        })
    }

    pub fn offer(sdp: impl Into<String>) -> Self {
        Message::SessionDescription(SessionDescription {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        })
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Message::SessionDescription(SessionDescription {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        })
    }

    pub fn ice_candidate(
        mid: impl Into<String>,
        mline_index: i32,
        candidate: impl Into<String>,
    ) -> Self {
        Message::IceCandidate(IceCandidate {
            mid: mid.into(),
            mline_index,
            candidate: candidate.into(),
        })
    }

    /// Element name of this message
    pub fn name(&self) -> &'static str {
        match self {
            Message::Version(_) => tokens::VERSION,
            Message::SessionDescription(_) => tokens::SDP,
            Message::IceCandidate(_) => tokens::ICE_CANDIDATE,
        }
    }

    /// Serialize into the generic element shape
    pub fn to_element(&self) -> Element {
        match self {
            Message::Version(v) => Element::new(tokens::VERSION)
                .with_attribute(tokens::DEPTH_ALPHA, if v.depth_alpha_enabled { "1" } else { "0" })
                .with_content(v.version.packed().to_string()),
            Message::SessionDescription(s) => Element::new(tokens::SDP)
                .with_attribute(tokens::SDP_TYPE, s.kind.as_str())
                .with_content(s.sdp.clone()),
            Message::IceCandidate(c) => Element::new(tokens::ICE_CANDIDATE)
                .with_attribute(tokens::ICE_MID, c.mid.clone())
                .with_attribute(tokens::ICE_MLINE_INDEX, c.mline_index.to_string())
                .with_content(c.candidate.clone()),
        }
    }

    /// Parse from the generic element shape
    pub fn from_element(element: &Element) -> Result<Self> {
        match element.name.as_str() {
            tokens::VERSION => {
                let content = element.content.trim();
                let packed = content.parse::<u32>().map_err(|_| Error::InvalidContent {
                    element: tokens::VERSION,
                    content: element.content.clone(),
                })?;
                // Older peers omit the flag entirely.
                let depth_alpha_enabled = element.attribute(tokens::DEPTH_ALPHA) == Some("1");
                Ok(Message::Version(VersionMessage {
                    version: ProtocolVersion::from_packed(packed),
                    depth_alpha_enabled,
                }))
            }
            tokens::SDP => {
                let kind_str = required(element, tokens::SDP, tokens::SDP_TYPE)?;
                let kind = SdpKind::parse(kind_str).ok_or_else(|| Error::InvalidAttribute {
                    attribute: tokens::SDP_TYPE,
                    value: kind_str.to_string(),
                })?;
                Ok(Message::SessionDescription(SessionDescription {
                    kind,
                    sdp: element.content.clone(),
                }))
            }
            tokens::ICE_CANDIDATE => {
                let mid = required(element, tokens::ICE_CANDIDATE, tokens::ICE_MID)?;
                let index_str = required(element, tokens::ICE_CANDIDATE, tokens::ICE_MLINE_INDEX)?;
                let mline_index =
                    index_str
                        .trim()
                        .parse::<i32>()
                        .map_err(|_| Error::InvalidAttribute {
                            attribute: tokens::ICE_MLINE_INDEX,
                            value: index_str.to_string(),
                        })?;
                Ok(Message::IceCandidate(IceCandidate {
                    mid: mid.to_string(),
                    mline_index,
                    candidate: element.content.clone(),
                }))
            }
            other => Err(Error::UnknownElement(other.to_string())),
        }
    }
}

fn required<'a>(
    element: &'a Element,
    name: &'static str,
    attribute: &'static str,
) -> Result<&'a str> {
    element.attribute(attribute).ok_or(Error::MissingAttribute {
        element: name,
        attribute,
    })
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Version(v) => write!(
                f,
                "Version({}, depth_alpha={})",
                v.version, v.depth_alpha_enabled
            ),
            Message::SessionDescription(s) => write!(f, "Sdp({}, {} bytes)", s.kind, s.sdp.len()),
            Message::IceCandidate(c) => {
                write!(f, "IceCandidate(mid={}, mline={})", c.mid, c.mline_index)
            }
        }
    }
}
