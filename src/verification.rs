//! Verification of host-supplied spending data
//!
//! External inputs arrive presigned. Before their amounts count toward
//! the verified total, the supplied scriptSig or witness is parsed
//! against the spent scriptPubKey and every signature is checked.

use crate::error::{SignResult, SignerError};
use crate::scripts::hash160_digest;
use crate::writers::{read_compact_size, sha256_digest};
use secp256k1::{ecdsa, schnorr, Message, Secp256k1, XOnlyPublicKey};

const OP_0: u8 = 0x00;
const OP_1: u8 = 0x51;
const OP_16: u8 = 0x60;
const OP_CHECKMULTISIG: u8 = 0xae;

enum SignatureScheme {
    Ecdsa,
    Schnorr,
}

/// Parsed spending data of one external input, ready to check against
/// a signature digest
pub struct SignatureVerifier {
    public_keys: Vec<Vec<u8>>,
    signatures: Vec<Vec<u8>>,
    threshold: usize,
    scheme: SignatureScheme,
    hash_type: Option<u8>,
}

impl SignatureVerifier {
    pub fn new(
        script_pubkey: &[u8],
        script_sig: Option<&[u8]>,
        witness: Option<&[u8]>,
    ) -> SignResult<Self> {
        let script_sig = script_sig.filter(|s| !s.is_empty());
        let witness = witness.filter(|w| !w.is_empty() && w[0] != 0);

        match script_pubkey {
            // P2TR
            [0x51, 0x20, ..] if script_pubkey.len() == 34 => {
                let stack = parse_witness(witness.ok_or_else(invalid_signature)?)?;
                if script_sig.is_some() || stack.len() != 1 {
                    return Err(invalid_signature());
                }
                let (sig, hash_type) = split_schnorr(&stack[0])?;
                Ok(Self {
                    public_keys: vec![script_pubkey[2..].to_vec()],
                    signatures: vec![sig],
                    threshold: 1,
                    scheme: SignatureScheme::Schnorr,
                    hash_type,
                })
            }
            // P2WPKH
            [0x00, 0x14, ..] if script_pubkey.len() == 22 => {
                if script_sig.is_some() {
                    return Err(invalid_signature());
                }
                let stack = parse_witness(witness.ok_or_else(invalid_signature)?)?;
                Self::from_pubkey_hash(&script_pubkey[2..], stack)
            }
            // P2WSH
            [0x00, 0x20, ..] if script_pubkey.len() == 34 => {
                if script_sig.is_some() {
                    return Err(invalid_signature());
                }
                let stack = parse_witness(witness.ok_or_else(invalid_signature)?)?;
                Self::from_script_stack(&script_pubkey[2..], stack, |s| sha256_digest(s).to_vec())
            }
            // P2PKH
            [0x76, 0xa9, 0x14, ..] if script_pubkey.len() == 25 => {
                if witness.is_some() {
                    return Err(invalid_signature());
                }
                let stack = parse_pushes(script_sig.ok_or_else(invalid_signature)?)?;
                Self::from_pubkey_hash(&script_pubkey[3..23], stack)
            }
            // P2SH: wrapped segwit or legacy multisig
            [0xa9, 0x14, ..] if script_pubkey.len() == 23 => {
                let script_hash = &script_pubkey[2..22];
                let stack = parse_pushes(script_sig.ok_or_else(invalid_signature)?)?;
                if stack.len() == 1 {
                    // wrapped segwit: the pushed program must hash to
                    // the script hash
                    let program = &stack[0];
                    if hash160_digest(program) != *script_hash {
                        return Err(invalid_signature());
                    }
                    let inner_stack = parse_witness(witness.ok_or_else(invalid_signature)?)?;
                    match program.as_slice() {
                        [0x00, 0x14, ..] if program.len() == 22 => {
                            Self::from_pubkey_hash(&program[2..], inner_stack)
                        }
                        [0x00, 0x20, ..] if program.len() == 34 => Self::from_script_stack(
                            &program[2..],
                            inner_stack,
                            |s| sha256_digest(s).to_vec(),
                        ),
                        _ => Err(SignerError::data_error("Unsupported script type")),
                    }
                } else {
                    if witness.is_some() {
                        return Err(invalid_signature());
                    }
                    Self::from_script_stack(script_hash, stack, |s| hash160_digest(s).to_vec())
                }
            }
            _ => Err(SignerError::data_error("Unsupported script type")),
        }
    }

    /// Single-sig: stack is [signature, pubkey]
    fn from_pubkey_hash(pubkey_hash: &[u8], stack: Vec<Vec<u8>>) -> SignResult<Self> {
        if stack.len() != 2 {
            return Err(invalid_signature());
        }
        let (sig, hash_type) = split_der(&stack[0])?;
        let pubkey = stack[1].clone();
        if hash160_digest(&pubkey) != *pubkey_hash {
            return Err(invalid_signature());
        }
        Ok(Self {
            public_keys: vec![pubkey],
            signatures: vec![sig],
            threshold: 1,
            scheme: SignatureScheme::Ecdsa,
            hash_type,
        })
    }

    /// Script-hash spend: last stack item is the script, preceding
    /// items (after the CHECKMULTISIG dummy) are signatures
    fn from_script_stack(
        expected_hash: &[u8],
        mut stack: Vec<Vec<u8>>,
        hash_fn: impl Fn(&[u8]) -> Vec<u8>,
    ) -> SignResult<Self> {
        let script = stack.pop().ok_or_else(invalid_signature)?;
        if hash_fn(&script) != expected_hash {
            return Err(invalid_signature());
        }
        let (public_keys, threshold) = parse_multisig_script(&script)?;
        if !stack.is_empty() && stack[0].is_empty() {
            stack.remove(0);
        }
        if stack.len() != threshold {
            return Err(invalid_signature());
        }
        let mut signatures = Vec::with_capacity(stack.len());
        let mut hash_type = None;
        for item in &stack {
            let (sig, ht) = split_der(item)?;
            if hash_type.is_some() && ht != hash_type {
                return Err(invalid_signature());
            }
            hash_type = ht;
            signatures.push(sig);
        }
        Ok(Self {
            public_keys,
            signatures,
            threshold,
            scheme: SignatureScheme::Ecdsa,
            hash_type,
        })
    }

    /// The hash type every signature commits to, if any was present
    pub fn ensure_hash_type(&self, expected: u8) -> SignResult<()> {
        match self.hash_type {
            None => Ok(()),
            Some(ht) if ht == expected => Ok(()),
            Some(_) => Err(SignerError::data_error("Unsupported sighash type")),
        }
    }

    /// Check every signature against the digest. Multisig keys are
    /// consumed in script order, so signature order must follow it.
    pub fn verify(&self, digest: &[u8; 32]) -> SignResult<()> {
        if self.signatures.len() < self.threshold {
            return Err(invalid_signature());
        }
        let secp = Secp256k1::verification_only();
        let message = Message::from_digest(*digest);

        match self.scheme {
            SignatureScheme::Schnorr => {
                let key = XOnlyPublicKey::from_slice(&self.public_keys[0])?;
                let sig = schnorr::Signature::from_slice(&self.signatures[0])
                    .map_err(|_| invalid_signature())?;
                secp.verify_schnorr(&sig, &message, &key)
                    .map_err(|_| invalid_signature())
            }
            SignatureScheme::Ecdsa => {
                let mut keys = self.public_keys.iter();
                'sigs: for raw_sig in &self.signatures {
                    let sig = ecdsa::Signature::from_der(raw_sig)
                        .map_err(|_| invalid_signature())?;
                    for key in keys.by_ref() {
                        let pubkey = secp256k1::PublicKey::from_slice(key)?;
                        if secp.verify_ecdsa(&message, &sig, &pubkey).is_ok() {
                            continue 'sigs;
                        }
                    }
                    return Err(invalid_signature());
                }
                Ok(())
            }
        }
    }
}

fn invalid_signature() -> SignerError {
    SignerError::data_error("Invalid signature")
}

/// BIP-143 scriptCode of a presigned input, recovered from its
/// spending data
pub fn script_code_for(
    script_pubkey: &[u8],
    script_sig: Option<&[u8]>,
    witness: Option<&[u8]>,
) -> SignResult<Vec<u8>> {
    match script_pubkey {
        [0x00, 0x14, ..] if script_pubkey.len() == 22 => {
            Ok(crate::scripts::p2pkh_script(&script_pubkey[2..]))
        }
        [0x00, 0x20, ..] if script_pubkey.len() == 34 => {
            let stack = parse_witness(witness.ok_or_else(invalid_signature)?)?;
            stack.last().cloned().ok_or_else(invalid_signature)
        }
        [0xa9, 0x14, ..] if script_pubkey.len() == 23 => {
            let stack = parse_pushes(script_sig.ok_or_else(invalid_signature)?)?;
            match stack.as_slice() {
                [program] if witness.is_some() => {
                    script_code_for(program, None, witness)
                }
                _ => Ok(script_pubkey.to_vec()),
            }
        }
        _ => Ok(script_pubkey.to_vec()),
    }
}

/// DER signature plus trailing hash-type byte
fn split_der(item: &[u8]) -> SignResult<(Vec<u8>, Option<u8>)> {
    if item.len() < 9 || item[0] != 0x30 {
        return Err(invalid_signature());
    }
    let der_len = item[1] as usize + 2;
    if der_len == item.len() {
        Ok((item.to_vec(), None))
    } else if der_len + 1 == item.len() {
        Ok((item[..der_len].to_vec(), Some(item[der_len])))
    } else {
        Err(invalid_signature())
    }
}

/// 64-byte Schnorr signature, optionally followed by a hash-type byte
fn split_schnorr(item: &[u8]) -> SignResult<(Vec<u8>, Option<u8>)> {
    match item.len() {
        64 => Ok((item.to_vec(), None)),
        65 => Ok((item[..64].to_vec(), Some(item[64]))),
        _ => Err(invalid_signature()),
    }
}

/// Serialized witness stack into its items
fn parse_witness(witness: &[u8]) -> SignResult<Vec<Vec<u8>>> {
    let mut offset = 0;
    let count = read_compact_size(witness, &mut offset)?;
    let mut items = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let len = read_compact_size(witness, &mut offset)? as usize;
        let item = witness
            .get(offset..offset + len)
            .ok_or_else(invalid_signature)?;
        offset += len;
        items.push(item.to_vec());
    }
    if offset != witness.len() {
        return Err(invalid_signature());
    }
    Ok(items)
}

/// scriptSig that consists only of data pushes (and OP_0 dummies)
fn parse_pushes(script: &[u8]) -> SignResult<Vec<Vec<u8>>> {
    let mut items = Vec::new();
    let mut offset = 0;
    while offset < script.len() {
        let op = script[offset];
        offset += 1;
        let len = match op {
            OP_0 => 0,
            1..=0x4b => op as usize,
            0x4c => {
                let n = *script.get(offset).ok_or_else(invalid_signature)? as usize;
                offset += 1;
                n
            }
            _ => return Err(invalid_signature()),
        };
        let item = script
            .get(offset..offset + len)
            .ok_or_else(invalid_signature)?;
        offset += len;
        items.push(item.to_vec());
    }
    Ok(items)
}

/// OP_m <pubkeys> OP_n OP_CHECKMULTISIG
fn parse_multisig_script(script: &[u8]) -> SignResult<(Vec<Vec<u8>>, usize)> {
    let err = || SignerError::data_error("Unsupported script type");
    if script.len() < 3 || *script.last().unwrap() != OP_CHECKMULTISIG {
        return Err(err());
    }
    let m_op = script[0];
    let n_op = script[script.len() - 2];
    if !(OP_1..=OP_16).contains(&m_op) || !(OP_1..=OP_16).contains(&n_op) {
        return Err(err());
    }
    let m = (m_op - OP_1 + 1) as usize;
    let n = (n_op - OP_1 + 1) as usize;

    let mut keys = Vec::with_capacity(n);
    let mut offset = 1;
    for _ in 0..n {
        let len = *script.get(offset).ok_or_else(err)? as usize;
        offset += 1;
        if len != 33 {
            return Err(err());
        }
        let key = script.get(offset..offset + len).ok_or_else(err)?;
        offset += len;
        keys.push(key.to_vec());
    }
    if offset != script.len() - 2 || m > n {
        return Err(err());
    }
    Ok((keys, m))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secp256k1::SecretKey;

    fn keypair(fill: u8) -> (SecretKey, Vec<u8>) {
        let secp = Secp256k1::new();
        let sk = SecretKey::from_slice(&[fill; 32]).unwrap();
        let pk = secp256k1::PublicKey::from_secret_key(&secp, &sk);
        (sk, pk.serialize().to_vec())
    }

    fn sign(sk: &SecretKey, digest: &[u8; 32]) -> Vec<u8> {
        let secp = Secp256k1::new();
        let mut sig = secp
            .sign_ecdsa(&Message::from_digest(*digest), sk)
            .serialize_der()
            .to_vec();
        sig.push(0x01);
        sig
    }

    #[test]
    fn test_p2pkh_external_input() {
        let (sk, pubkey) = keypair(7);
        let digest = [0x44; 32];
        let script_pubkey = crate::scripts::p2pkh_script(&hash160_digest(&pubkey));

        let mut script_sig = Vec::new();
        let sig = sign(&sk, &digest);
        crate::writers::write_op_push(&mut script_sig, sig.len());
        script_sig.extend_from_slice(&sig);
        crate::writers::write_op_push(&mut script_sig, pubkey.len());
        script_sig.extend_from_slice(&pubkey);

        let verifier = SignatureVerifier::new(&script_pubkey, Some(&script_sig), None).unwrap();
        verifier.ensure_hash_type(0x01).unwrap();
        verifier.verify(&digest).unwrap();

        let wrong = [0x45; 32];
        assert!(verifier.verify(&wrong).is_err());
    }

    #[test]
    fn test_p2wpkh_external_input() {
        let (sk, pubkey) = keypair(9);
        let digest = [0x10; 32];
        let script_pubkey = crate::scripts::p2wpkh_script(&hash160_digest(&pubkey));
        let witness = crate::scripts::witness_p2wpkh(
            &sign(&sk, &digest)[..sign(&sk, &digest).len() - 1],
            0x01,
            &pubkey,
        );

        let verifier = SignatureVerifier::new(&script_pubkey, None, Some(&witness)).unwrap();
        verifier.verify(&digest).unwrap();
    }

    #[test]
    fn test_wrong_pubkey_hash_rejected() {
        let (sk, pubkey) = keypair(7);
        let digest = [0x44; 32];
        let script_pubkey = crate::scripts::p2pkh_script(&[0xee; 20]);

        let mut script_sig = Vec::new();
        let sig = sign(&sk, &digest);
        crate::writers::write_op_push(&mut script_sig, sig.len());
        script_sig.extend_from_slice(&sig);
        crate::writers::write_op_push(&mut script_sig, pubkey.len());
        script_sig.extend_from_slice(&pubkey);

        assert!(SignatureVerifier::new(&script_pubkey, Some(&script_sig), None).is_err());
    }

    #[test]
    fn test_multisig_witness_verification() {
        let (sk1, pk1) = keypair(3);
        let (sk2, pk2) = keypair(4);
        let (_, pk3) = keypair(5);
        let digest = [0x77; 32];

        let script = crate::scripts::multisig_redeem_script(
            &[pk1.clone(), pk2.clone(), pk3.clone()],
            2,
        )
        .unwrap();
        let script_pubkey = crate::scripts::p2wsh_script(&sha256_digest(&script));

        let sigs = vec![
            sign(&sk1, &digest)[..sign(&sk1, &digest).len() - 1].to_vec(),
            sign(&sk2, &digest)[..sign(&sk2, &digest).len() - 1].to_vec(),
        ];
        let witness = crate::scripts::witness_multisig(&sigs, 0x01, &script);

        let verifier = SignatureVerifier::new(&script_pubkey, None, Some(&witness)).unwrap();
        verifier.verify(&digest).unwrap();
    }

    #[test]
    fn test_nonstandard_hash_type_rejected() {
        let (sk, pubkey) = keypair(7);
        let digest = [0x44; 32];
        let script_pubkey = crate::scripts::p2pkh_script(&hash160_digest(&pubkey));

        let secp = Secp256k1::new();
        let mut sig = secp
            .sign_ecdsa(&Message::from_digest(digest), &sk)
            .serialize_der()
            .to_vec();
        sig.push(0x83); // SIGHASH_SINGLE|ANYONECANPAY

        let mut script_sig = Vec::new();
        crate::writers::write_op_push(&mut script_sig, sig.len());
        script_sig.extend_from_slice(&sig);
        crate::writers::write_op_push(&mut script_sig, pubkey.len());
        script_sig.extend_from_slice(&pubkey);

        let verifier = SignatureVerifier::new(&script_pubkey, Some(&script_sig), None).unwrap();
        assert!(verifier.ensure_hash_type(0x01).is_err());
    }
}
