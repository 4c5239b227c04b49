//! Serialization and signing of the `work(farmer, hash, nonce)` contract
//! invocation as a Stellar transaction envelope.
//!
//! Only the envelope shape the relay accepts is produced: a single
//! invoke-host-function operation sourced from (and signed by) the
//! farmer's custodial account. The simulation's `SorobanTransactionData`
//! is spliced into the envelope ext verbatim, so no XDR reader is needed.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ed25519_dalek::{Signer, SigningKey};
use pooler_chain::xdr::XdrWriter;
use sha2::{Digest, Sha256};

const ENVELOPE_TYPE_TX: u32 = 2;
const KEY_TYPE_ED25519: u32 = 0;
const PRECOND_NONE: u32 = 0;
const MEMO_NONE: u32 = 0;
const OP_INVOKE_HOST_FUNCTION: u32 = 24;
const HOST_FUNCTION_INVOKE_CONTRACT: u32 = 0;

/// Network base fee in stroops; the relay fee-bumps on top and the
/// simulation's resource fee is added before signing.
const BASE_FEE: u32 = 100;

/// The `work` invocation for one farmer.
#[derive(Debug, Clone)]
pub struct WorkCall {
    pub contract_id: [u8; 32],
    /// Custodial account: transaction source, first contract argument and
    /// signing identity all at once.
    pub farmer_public_key: [u8; 32],
    pub hash: [u8; 32],
    pub nonce: u64,
}

/// Unsigned envelope with a void ext, suitable for `simulateTransaction`.
pub fn build_unsigned(call: &WorkCall, sequence: i64) -> String {
    let mut w = XdrWriter::new();
    w.u32(ENVELOPE_TYPE_TX);
    write_tx(&mut w, call, BASE_FEE, sequence, None);
    w.u32(0); // no signatures
    BASE64.encode(w.into_bytes())
}

/// Signed envelope carrying the simulation's transaction data and fee.
pub fn build_signed(
    call: &WorkCall,
    sequence: i64,
    soroban_data: &[u8],
    resource_fee: u64,
    network_passphrase: &str,
    signing_key: &SigningKey,
) -> String {
    let fee = BASE_FEE.saturating_add(resource_fee.min(u32::MAX as u64) as u32);

    let mut body = XdrWriter::new();
    write_tx(&mut body, call, fee, sequence, Some(soroban_data));
    let body = body.into_bytes();

    // Signature payload: SHA-256 of network id, envelope type and body.
    let network_id = Sha256::digest(network_passphrase.as_bytes());
    let mut payload = Sha256::new();
    payload.update(network_id);
    payload.update(ENVELOPE_TYPE_TX.to_be_bytes());
    payload.update(&body);
    let tx_hash = payload.finalize();

    let signature = signing_key.sign(&tx_hash);
    let hint: [u8; 4] = {
        let pk = signing_key.verifying_key().to_bytes();
        [pk[28], pk[29], pk[30], pk[31]]
    };

    let mut w = XdrWriter::new();
    w.u32(ENVELOPE_TYPE_TX);
    w.raw(&body);
    w.u32(1); // one decorated signature
    w.bytes_fixed(&hint);
    w.bytes_var(&signature.to_bytes());
    BASE64.encode(w.into_bytes())
}

/// Hash the relay reports for a signed envelope is computed the same way
/// the signature payload is; exposed for diagnostics.
pub fn transaction_hash(
    call: &WorkCall,
    sequence: i64,
    soroban_data: &[u8],
    resource_fee: u64,
    network_passphrase: &str,
) -> [u8; 32] {
    let fee = BASE_FEE.saturating_add(resource_fee.min(u32::MAX as u64) as u32);
    let mut body = XdrWriter::new();
    write_tx(&mut body, call, fee, sequence, Some(soroban_data));

    let network_id = Sha256::digest(network_passphrase.as_bytes());
    let mut payload = Sha256::new();
    payload.update(network_id);
    payload.update(ENVELOPE_TYPE_TX.to_be_bytes());
    payload.update(body.into_bytes());
    payload.finalize().into()
}

fn write_tx(w: &mut XdrWriter, call: &WorkCall, fee: u32, sequence: i64, ext: Option<&[u8]>) {
    // MuxedAccount source
    w.u32(KEY_TYPE_ED25519).bytes_fixed(&call.farmer_public_key);
    w.u32(fee);
    w.i64(sequence);
    w.u32(PRECOND_NONE);
    w.u32(MEMO_NONE);

    // exactly one operation, no per-op source override
    w.u32(1);
    w.u32(0);
    w.u32(OP_INVOKE_HOST_FUNCTION);
    w.u32(HOST_FUNCTION_INVOKE_CONTRACT);

    // InvokeContractArgs { contract, "work", [farmer, hash, nonce] }
    w.sc_address_contract(&call.contract_id);
    w.string("work");
    w.u32(3);
    w.scv_account_address(&call.farmer_public_key);
    w.scv_bytes(&call.hash);
    w.scv_u64(call.nonce);

    // no auth entries
    w.u32(0);

    match ext {
        None => {
            w.u32(0);
        }
        Some(data) => {
            w.u32(1);
            w.raw(data);
        }
    }
}
