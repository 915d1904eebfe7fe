//! Typed ICE candidates built from join response candidate records.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use derive_more::{Display, Error};

use crate::response::GroupJoinResponseCandidate;

/// ICE candidate types (RFC 8445)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, derive_more::FromStr)]
#[from_str(rename_all = "lowercase")]
pub enum CandidateType {
    #[display("host")]
    Host,
    /// Server reflexive (STUN)
    #[display("srflx")]
    Srflx,
    /// Peer reflexive
    #[display("prflx")]
    Prflx,
    /// TURN relay
    #[display("relay")]
    Relay,
}

#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum CandidateError {
    #[display("candidate field `{field}` is missing")]
    MissingField { field: &'static str },
    #[display("candidate field `{field}` has invalid value {value:?}")]
    InvalidField { field: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceCandidate {
    pub foundation: String,
    /// 1 for RTP, 2 for RTCP
    pub component: u32,
    /// Lower-case transport protocol, `udp` or `tcp`
    pub protocol: String,
    pub priority: u32,
    pub address: SocketAddr,
    pub candidate_type: CandidateType,
    /// Base address of reflexive and relay candidates
    pub related_address: Option<SocketAddr>,
    pub tcp_type: Option<String>,
    pub generation: u32,
    pub network_id: u32,
    pub id: String,
}

impl IceCandidate {
    /// Formats the candidate as an SDP `candidate` attribute (RFC 8839).
    pub fn to_sdp_string(&self) -> String {
        let mut sdp = format!(
            "candidate:{} {} {} {} {} {} typ {}",
            self.foundation,
            self.component,
            self.protocol,
            self.priority,
            self.address.ip(),
            self.address.port(),
            self.candidate_type
        );
        if let Some(related) = self.related_address {
            sdp.push_str(&format!(" raddr {} rport {}", related.ip(), related.port()));
        }
        if let Some(tcp_type) = &self.tcp_type {
            sdp.push_str(&format!(" tcptype {tcp_type}"));
        }
        sdp.push_str(&format!(
            " generation {} network-id {}",
            self.generation, self.network_id
        ));
        sdp
    }
}

impl fmt::Display for IceCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sdp_string())
    }
}

fn required<'a>(field: &'static str, value: &'a str) -> Result<&'a str, CandidateError> {
    let value = value.trim();
    if value.is_empty() {
        Err(CandidateError::MissingField { field })
    } else {
        Ok(value)
    }
}

fn parse_field<T: FromStr>(field: &'static str, value: &str) -> Result<T, CandidateError> {
    required(field, value)?
        .parse()
        .map_err(|_| CandidateError::InvalidField {
            field,
            value: value.to_owned(),
        })
}

/// Parses `value` when present, `default` otherwise.
fn parse_optional<T: FromStr>(field: &'static str, value: &str, default: T) -> Result<T, CandidateError> {
    if value.trim().is_empty() {
        Ok(default)
    } else {
        parse_field(field, value)
    }
}

impl TryFrom<&GroupJoinResponseCandidate> for IceCandidate {
    type Error = CandidateError;

    fn try_from(raw: &GroupJoinResponseCandidate) -> Result<Self, Self::Error> {
        let ip: IpAddr = parse_field("ip", &raw.ip)?;
        let port: u16 = parse_field("port", &raw.port)?;
        let candidate_type = required("type", &raw.candidate_type)?
            .to_ascii_lowercase()
            .parse::<CandidateType>()
            .map_err(|_| CandidateError::InvalidField {
                field: "type",
                value: raw.candidate_type.clone(),
            })?;

        let related_address = match (raw.rel_addr.trim(), raw.rel_port.trim()) {
            ("", _) | (_, "") => None,
            (rel_addr, rel_port) => Some(SocketAddr::new(
                parse_field("rel-addr", rel_addr)?,
                parse_field("rel-port", rel_port)?,
            )),
        };

        let protocol = match raw.protocol.trim() {
            "" => "udp".to_owned(),
            protocol => protocol.to_ascii_lowercase(),
        };

        Ok(Self {
            foundation: required("foundation", &raw.foundation)?.to_owned(),
            component: parse_field("component", &raw.component)?,
            protocol,
            priority: parse_field("priority", &raw.priority)?,
            address: SocketAddr::new(ip, port),
            candidate_type,
            related_address,
            tcp_type: Some(raw.tcp_type.trim().to_owned()).filter(|t| !t.is_empty()),
            generation: parse_optional("generation", &raw.generation, 0)?,
            network_id: parse_optional("network", &raw.network, 0)?,
            id: raw.id.clone(),
        })
    }
}
