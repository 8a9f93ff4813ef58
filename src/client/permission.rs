use std::fmt;
use std::str::FromStr;

use crate::ProtocolError;

/// Access a domain has to a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    None,
    Read,
    Write,
    /// Read and write
    Both,
}

impl Permission {
    /// Wire letter: `n`, `r`, `w` or `b`.
    pub fn as_char(self) -> char {
        match self {
            Permission::None => 'n',
            Permission::Read => 'r',
            Permission::Write => 'w',
            Permission::Both => 'b',
        }
    }
}

impl TryFrom<char> for Permission {
    type Error = ProtocolError;

    fn try_from(c: char) -> Result<Self, Self::Error> {
        match c {
            'n' => Ok(Permission::None),
            'r' => Ok(Permission::Read),
            'w' => Ok(Permission::Write),
            'b' => Ok(Permission::Both),
            other => Err(ProtocolError::MalformedPayload(format!(
                "unknown permission letter {other:?}"
            ))),
        }
    }
}

/// One `<letter><domid>` entry of a node's permission list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodePermission {
    pub domid: u16,
    pub perm: Permission,
}

impl fmt::Display for NodePermission {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}{}", self.perm.as_char(), self.domid)
    }
}

impl FromStr for NodePermission {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let letter = chars
            .next()
            .ok_or_else(|| ProtocolError::MalformedPayload("empty permission entry".to_string()))?;
        let perm = Permission::try_from(letter)?;
        let domid = chars
            .as_str()
            .parse::<u16>()
            .map_err(|e| ProtocolError::MalformedPayload(format!("bad domid in permission {s:?}: {e}")))?;
        Ok(Self { domid, perm })
    }
}
