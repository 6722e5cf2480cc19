// Copyright (c) 2022-2023 The MobileCoin Foundation

use bitcoin::{
    opcodes::all::{OP_CHECKMULTISIG, OP_PUSHNUM_1, OP_PUSHNUM_16},
    script::{Builder, Instruction},
    PublicKey, Script, ScriptBuf,
};

use crate::{input_data::Multisig, Error};

/// Derive each cosigner child key, in descriptor order
pub fn cosigner_keys(multisig: &Multisig) -> Result<Vec<PublicKey>, Error> {
    multisig.pubkeys.iter().map(|k| k.derive()).collect()
}

/// Sort keys by compressed serialization (BIP67)
pub fn sort_keys(keys: &mut [PublicKey]) {
    keys.sort_by_key(|k| k.inner.serialize());
}

/// Build the `OP_m <pubkeys> OP_n OP_CHECKMULTISIG` redeem script for a
/// multisig descriptor
pub fn redeem_script(multisig: &Multisig) -> Result<ScriptBuf, Error> {
    multisig.validate()?;

    let mut keys = cosigner_keys(multisig)?;
    sort_keys(&mut keys);

    let mut b = Builder::new().push_int(multisig.m as i64);
    for k in &keys {
        b = b.push_key(k);
    }

    Ok(b
        .push_int(keys.len() as i64)
        .push_opcode(OP_CHECKMULTISIG)
        .into_script())
}

/// Parse a bare multisig script to `(m, keys)`
pub fn parse_multisig(script: &Script) -> Result<(usize, Vec<PublicKey>), Error> {
    let bad = |r: &str| Error::InvalidInput(format!("not a multisig script: {r}"));

    let mut ins = Vec::new();
    for i in script.instructions() {
        ins.push(i.map_err(|e| bad(&e.to_string()))?);
    }

    if ins.len() < 4 {
        return Err(bad("too short"));
    }

    let small_int = |i: &Instruction| -> Option<usize> {
        match i {
            Instruction::Op(op)
                if op.to_u8() >= OP_PUSHNUM_1.to_u8() && op.to_u8() <= OP_PUSHNUM_16.to_u8() =>
            {
                Some((op.to_u8() - OP_PUSHNUM_1.to_u8() + 1) as usize)
            }
            _ => None,
        }
    };

    let m = small_int(&ins[0]).ok_or_else(|| bad("missing threshold"))?;
    let n = small_int(&ins[ins.len() - 2]).ok_or_else(|| bad("missing key count"))?;

    match &ins[ins.len() - 1] {
        Instruction::Op(op) if *op == OP_CHECKMULTISIG => (),
        _ => return Err(bad("missing OP_CHECKMULTISIG")),
    }

    let mut keys = Vec::with_capacity(n);
    for i in &ins[1..ins.len() - 2] {
        match i {
            Instruction::PushBytes(b) => keys.push(
                PublicKey::from_slice(b.as_bytes()).map_err(|e| bad(&e.to_string()))?,
            ),
            _ => return Err(bad("unexpected opcode")),
        }
    }

    if keys.len() != n || m > n {
        return Err(bad("key count mismatch"));
    }

    Ok((m, keys))
}

#[cfg(test)]
mod tests {
    use bitcoin::bip32::{Xpriv, Xpub};

    use super::*;
    use crate::{input_data::PublicKeyInfo, secp, xkey, Network};

    fn account_xpub(seed: u8) -> String {
        let k = Xpriv::new_master(bitcoin::NetworkKind::Test, &[seed; 32]).unwrap();
        xkey::encode_xpub(&Xpub::from_priv(secp(), &k), Network::Testnet)
    }

    #[test]
    fn redeem_script_is_order_independent() {
        let keys: Vec<_> = (1..=3)
            .map(|i| PublicKeyInfo::new(account_xpub(i), &[0, 4]))
            .collect();

        let a = Multisig::new(2, keys.clone()).unwrap();
        let mut rev = keys;
        rev.reverse();
        let b = Multisig::new(2, rev).unwrap();

        let sa = redeem_script(&a).unwrap();
        let sb = redeem_script(&b).unwrap();
        assert_eq!(sa, sb);

        let (m, parsed) = parse_multisig(&sa).unwrap();
        assert_eq!(m, 2);
        assert_eq!(parsed.len(), 3);

        let mut sorted = parsed.clone();
        sort_keys(&mut sorted);
        assert_eq!(parsed, sorted);
    }

    #[test]
    fn parse_rejects_non_multisig() {
        let s = ScriptBuf::from_bytes(vec![0x6a, 0x02, 0x01, 0x02]);
        assert!(parse_multisig(&s).is_err());
    }
}
