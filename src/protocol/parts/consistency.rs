use crate::protocol::util_sync;
use crate::{CqlError, CqlResult};

/// Consistency level of a request.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub enum Consistency {
    /// Closest replica, write-only.
    Any = 0x0000,
    /// A single replica.
    One = 0x0001,
    /// Two replicas.
    Two = 0x0002,
    /// Three replicas.
    Three = 0x0003,
    /// A majority of replicas.
    #[default]
    Quorum = 0x0004,
    /// All replicas.
    All = 0x0005,
    /// A majority within the local datacenter.
    LocalQuorum = 0x0006,
    /// A majority within every datacenter.
    EachQuorum = 0x0007,
    /// Linearizable, for LWT reads.
    Serial = 0x0008,
    /// Linearizable within the local datacenter.
    LocalSerial = 0x0009,
    /// A single replica within the local datacenter.
    LocalOne = 0x000A,
}

impl Consistency {
    pub(crate) fn try_new(code: u16) -> CqlResult<Self> {
        Ok(match code {
            0x0000 => Self::Any,
            0x0001 => Self::One,
            0x0002 => Self::Two,
            0x0003 => Self::Three,
            0x0004 => Self::Quorum,
            0x0005 => Self::All,
            0x0006 => Self::LocalQuorum,
            0x0007 => Self::EachQuorum,
            0x0008 => Self::Serial,
            0x0009 => Self::LocalSerial,
            0x000A => Self::LocalOne,
            code => {
                return Err(CqlError::FrameFormat(format!(
                    "illegal consistency code 0x{code:04X}"
                )))
            }
        })
    }

    /// Whether this is one of the serial levels usable as a serial
    /// consistency of a conditional update.
    pub fn is_serial(self) -> bool {
        matches!(self, Self::Serial | Self::LocalSerial)
    }

    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn emit(self, w: &mut dyn std::io::Write) -> CqlResult<()> {
        util_sync::write_short(self as u16, w)
    }

    pub(crate) fn parse(rdr: &mut dyn std::io::Read) -> CqlResult<Self> {
        Self::try_new(util_sync::read_short(rdr)?)
    }
}

impl std::fmt::Display for Consistency {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            fmt,
            "{}",
            match self {
                Self::Any => "ANY",
                Self::One => "ONE",
                Self::Two => "TWO",
                Self::Three => "THREE",
                Self::Quorum => "QUORUM",
                Self::All => "ALL",
                Self::LocalQuorum => "LOCAL_QUORUM",
                Self::EachQuorum => "EACH_QUORUM",
                Self::Serial => "SERIAL",
                Self::LocalSerial => "LOCAL_SERIAL",
                Self::LocalOne => "LOCAL_ONE",
            }
        )
    }
}
