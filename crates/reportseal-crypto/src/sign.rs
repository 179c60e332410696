// EIP-155 legacy transaction signing
//
// Anchoring sends one contract call per digest. Legacy transactions are
// accepted by every EVM chain we target, so there is no EIP-1559 path.

use anyhow::{anyhow, Result};
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};

use crate::address::Address;
use crate::hash::keccak256;
use crate::keys::address_of;
use crate::rlp;

/// Unsigned legacy transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyTransaction {
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub to: Address,
    pub value: u128,
    pub data: Vec<u8>,
    pub chain_id: u64,
}

/// Signed transaction ready for `eth_sendRawTransaction`.
#[derive(Debug, Clone)]
pub struct SignedTransaction {
    /// RLP-encoded signed transaction.
    pub raw: Vec<u8>,
    /// Transaction hash, keccak256 of `raw`.
    pub hash: [u8; 32],
}

impl SignedTransaction {
    pub fn raw_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.raw))
    }

    pub fn hash_hex(&self) -> String {
        format!("0x{}", hex::encode(self.hash))
    }
}

impl LegacyTransaction {
    fn fields(&self) -> Vec<Vec<u8>> {
        vec![
            rlp::encode_uint(u128::from(self.nonce)),
            rlp::encode_uint(self.gas_price),
            rlp::encode_uint(u128::from(self.gas_limit)),
            rlp::encode_bytes(self.to.as_bytes()),
            rlp::encode_uint(self.value),
            rlp::encode_bytes(&self.data),
        ]
    }

    /// Hash signed under EIP-155: keccak256(rlp([..fields, chainId, 0, 0])).
    pub fn signing_hash(&self) -> [u8; 32] {
        let mut items = self.fields();
        items.push(rlp::encode_uint(u128::from(self.chain_id)));
        items.push(rlp::encode_uint(0));
        items.push(rlp::encode_uint(0));
        keccak256(&rlp::encode_list(&items))
    }
}

/// Signs a transaction with EIP-155 replay protection.
pub fn sign_transaction(signing_key: &SigningKey, tx: &LegacyTransaction) -> Result<SignedTransaction> {
    let sighash = tx.signing_hash();
    let (signature, recovery_id) = signing_key
        .sign_prehash_recoverable(&sighash)
        .map_err(|e| anyhow!("Failed to sign transaction: {}", e))?;

    let v = tx
        .chain_id
        .checked_mul(2)
        .and_then(|n| n.checked_add(35 + u64::from(recovery_id.to_byte())))
        .ok_or_else(|| anyhow!("Chain id {} too large for EIP-155", tx.chain_id))?;

    let sig_bytes = signature.to_bytes();
    let (r, s) = sig_bytes.split_at(32);

    let mut items = tx.fields();
    items.push(rlp::encode_uint(u128::from(v)));
    items.push(rlp::encode_uint_bytes(r));
    items.push(rlp::encode_uint_bytes(s));

    let raw = rlp::encode_list(&items);
    let hash = keccak256(&raw);
    Ok(SignedTransaction { raw, hash })
}

/// A signed transaction decoded back into its parts, with the recovered sender.
#[derive(Debug, Clone)]
pub struct DecodedTransaction {
    pub tx: LegacyTransaction,
    pub from: Address,
    pub hash: [u8; 32],
}

fn left_pad_32(bytes: &[u8]) -> Result<[u8; 32]> {
    if bytes.len() > 32 {
        return Err(anyhow!("Signature scalar longer than 32 bytes"));
    }
    let mut out = [0u8; 32];
    out[32 - bytes.len()..].copy_from_slice(bytes);
    Ok(out)
}

/// Decodes a raw EIP-155 legacy transaction and recovers its sender.
pub fn decode_signed_transaction(raw: &[u8]) -> Result<DecodedTransaction> {
    let item = rlp::decode(raw)?;
    let fields = item.as_list()?;
    if fields.len() != 9 {
        return Err(anyhow!(
            "Expected 9 fields in legacy transaction, got {}",
            fields.len()
        ));
    }

    let to_bytes: [u8; 20] = fields[3]
        .as_bytes()?
        .try_into()
        .map_err(|_| anyhow!("Transaction recipient must be 20 bytes"))?;

    let v = u64::try_from(fields[6].as_u128()?).map_err(|_| anyhow!("v out of range"))?;
    if v < 35 {
        return Err(anyhow!("Transaction is not EIP-155 protected (v = {})", v));
    }
    let chain_id = (v - 35) / 2;
    let recovery_byte = ((v - 35) % 2) as u8;

    let tx = LegacyTransaction {
        nonce: u64::try_from(fields[0].as_u128()?).map_err(|_| anyhow!("nonce out of range"))?,
        gas_price: fields[1].as_u128()?,
        gas_limit: u64::try_from(fields[2].as_u128()?).map_err(|_| anyhow!("gas out of range"))?,
        to: Address::from_bytes(to_bytes),
        value: fields[4].as_u128()?,
        data: fields[5].as_bytes()?.to_vec(),
        chain_id,
    };

    let r = left_pad_32(fields[7].as_bytes()?)?;
    let s = left_pad_32(fields[8].as_bytes()?)?;
    let signature = Signature::from_scalars(r, s).map_err(|e| anyhow!("Invalid signature: {}", e))?;
    let recovery_id = RecoveryId::from_byte(recovery_byte)
        .ok_or_else(|| anyhow!("Invalid recovery id {}", recovery_byte))?;

    let verifying_key = VerifyingKey::recover_from_prehash(&tx.signing_hash(), &signature, recovery_id)
        .map_err(|e| anyhow!("Failed to recover sender: {}", e))?;

    Ok(DecodedTransaction {
        from: address_of(&verifying_key),
        hash: keccak256(raw),
        tx,
    })
}
