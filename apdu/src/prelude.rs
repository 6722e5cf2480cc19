//! Prelude to simplify downstream use of APDU objects
//!

pub use crate::{
    app_info::{FirmwareFlags, FirmwareVersion, FirmwareVersionReq},
    hash_input::{HashInput, HashInputFinalizeReq, HashInputKind, HashInputStartReq, HashMode},
    message::{SignMessagePrepareReq, SignMessageReq},
    sign::{DerSignature, HashSignReq},
    status::{classify, StatusClass, StatusWord},
    trusted_input::{TrustedInput, TrustedInputReq},
    wallet_key::{AddressFormat, WalletPublicKey, WalletPublicKeyReq},
    ApduError, ApduReq, Instruction,
};
