// Copyright (c) 2022-2023 The MobileCoin Foundation

//! APDU status words returned by the Bitcoin application

use num_enum::TryFromPrimitive;

/// Known status words
#[derive(Copy, Clone, Debug, PartialEq, Eq, TryFromPrimitive, strum::Display)]
#[repr(u16)]
pub enum StatusWord {
    Ok = 0x9000,
    WrongLength = 0x6700,
    /// Device locked, PIN entry required
    SecurityNotSatisfied = 0x6982,
    /// User declined the request on the device
    ConditionsNotSatisfied = 0x6985,
    IncorrectData = 0x6a80,
    NotEnoughSpace = 0x6a84,
    IncorrectP1P2 = 0x6b00,
    /// Instruction not supported, usually the wrong app is open
    InsNotSupported = 0x6d00,
    /// Class not supported, usually no app is open
    ClaNotSupported = 0x6e00,
    /// Requested app is not open
    AppNotOpen = 0x6511,
    /// Device locked (newer firmware)
    Locked = 0x5515,
    TechnicalProblem = 0x6f00,
}

/// Status word classes, mapped to error kinds by the client
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StatusClass {
    Ok,
    UserRejected,
    Locked,
    AppNotOpen,
    Other,
}

impl StatusWord {
    /// Parse a raw status word
    pub fn parse(sw: u16) -> Option<Self> {
        Self::try_from(sw).ok()
    }

    /// Classify this status word
    pub fn class(&self) -> StatusClass {
        match self {
            StatusWord::Ok => StatusClass::Ok,
            StatusWord::ConditionsNotSatisfied => StatusClass::UserRejected,
            StatusWord::SecurityNotSatisfied | StatusWord::Locked => StatusClass::Locked,
            StatusWord::InsNotSupported | StatusWord::ClaNotSupported | StatusWord::AppNotOpen => {
                StatusClass::AppNotOpen
            }
            _ => StatusClass::Other,
        }
    }
}

/// Classify a raw status word
pub fn classify(sw: u16) -> StatusClass {
    match StatusWord::parse(sw) {
        Some(s) => s.class(),
        None => StatusClass::Other,
    }
}
