pub mod riak {
    tonic::include_proto!("riak");
}

pub use riak::*;

/// One-byte message codes that tag every PBC frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageCode {
    ErrorResp = 0,
    YokozunaSchemaGetReq = 58,
    YokozunaSchemaGetResp = 59,
    DtFetchReq = 80,
    DtFetchResp = 81,
    DtUpdateReq = 82,
    DtUpdateResp = 83,
    TsDelReq = 94,
    TsDelResp = 95,
}

impl MessageCode {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::ErrorResp,
            58 => Self::YokozunaSchemaGetReq,
            59 => Self::YokozunaSchemaGetResp,
            80 => Self::DtFetchReq,
            81 => Self::DtFetchResp,
            82 => Self::DtUpdateReq,
            83 => Self::DtUpdateResp,
            94 => Self::TsDelReq,
            95 => Self::TsDelResp,
            _ => return None,
        })
    }
}

impl std::fmt::Display for MessageCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}({})", self.as_u8())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_codes_are_rejected() {
        assert_eq!(MessageCode::from_u8(95), Some(MessageCode::TsDelResp));
        assert_eq!(MessageCode::from_u8(1), None);
        assert_eq!(MessageCode::from_u8(255), None);
    }

    #[test]
    fn display_includes_numeric_code() {
        assert_eq!(MessageCode::TsDelReq.to_string(), "TsDelReq(94)");
    }
}
