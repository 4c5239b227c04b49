//! Minimal XDR writer for the handful of ledger structures the pooler
//! sends upstream: `getLedgerEntries` request keys and the pieces of the
//! `work` transaction envelope. Reads never need XDR because the RPC is
//! asked for its JSON representation instead.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

// LedgerEntryType discriminants.
const LEDGER_ENTRY_ACCOUNT: u32 = 0;
const LEDGER_ENTRY_CONTRACT_DATA: u32 = 6;

// ScVal discriminants.
pub const SCV_U32: u32 = 3;
pub const SCV_U64: u32 = 5;
pub const SCV_BYTES: u32 = 13;
pub const SCV_SYMBOL: u32 = 15;
pub const SCV_VEC: u32 = 16;
pub const SCV_ADDRESS: u32 = 18;
pub const SCV_LEDGER_KEY_CONTRACT_INSTANCE: u32 = 20;

// ScAddress / PublicKey discriminants.
const SC_ADDRESS_ACCOUNT: u32 = 0;
const SC_ADDRESS_CONTRACT: u32 = 1;
const PUBLIC_KEY_ED25519: u32 = 0;

/// Contract storage durability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Durability {
    Temporary = 0,
    Persistent = 1,
}

/// Big-endian XDR byte writer.
#[derive(Debug, Default)]
pub struct XdrWriter {
    buf: Vec<u8>,
}

impl XdrWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn u64(&mut self, v: u64) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn i64(&mut self, v: i64) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    /// Fixed-length opaque data: no length prefix, padded to 4 bytes.
    pub fn bytes_fixed(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self.pad(bytes.len());
        self
    }

    /// Variable-length opaque data: u32 length prefix, padded to 4 bytes.
    pub fn bytes_var(&mut self, bytes: &[u8]) -> &mut Self {
        self.u32(bytes.len() as u32);
        self.buf.extend_from_slice(bytes);
        self.pad(bytes.len());
        self
    }

    /// XDR string, wire-identical to variable-length opaque data.
    pub fn string(&mut self, s: &str) -> &mut Self {
        self.bytes_var(s.as_bytes())
    }

    /// Raw pre-encoded XDR, appended verbatim.
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn scv_symbol(&mut self, s: &str) -> &mut Self {
        self.u32(SCV_SYMBOL).string(s)
    }

    pub fn scv_u32(&mut self, v: u32) -> &mut Self {
        self.u32(SCV_U32).u32(v)
    }

    pub fn scv_u64(&mut self, v: u64) -> &mut Self {
        self.u32(SCV_U64).u64(v)
    }

    pub fn scv_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.u32(SCV_BYTES).bytes_var(bytes)
    }

    pub fn scv_account_address(&mut self, public_key: &[u8; 32]) -> &mut Self {
        self.u32(SCV_ADDRESS);
        self.sc_address_account(public_key)
    }

    pub fn sc_address_account(&mut self, public_key: &[u8; 32]) -> &mut Self {
        self.u32(SC_ADDRESS_ACCOUNT).account_id(public_key)
    }

    pub fn sc_address_contract(&mut self, contract_id: &[u8; 32]) -> &mut Self {
        self.u32(SC_ADDRESS_CONTRACT).bytes_fixed(contract_id)
    }

    /// AccountID: PublicKey union with the ed25519 arm.
    pub fn account_id(&mut self, public_key: &[u8; 32]) -> &mut Self {
        self.u32(PUBLIC_KEY_ED25519).bytes_fixed(public_key)
    }

    fn pad(&mut self, len: usize) {
        for _ in 0..(4 - len % 4) % 4 {
            self.buf.push(0);
        }
    }
}

/// `LedgerKey::ContractData` for the contract instance entry, base64.
pub fn contract_instance_key(contract_id: &[u8; 32]) -> String {
    let mut w = XdrWriter::new();
    w.u32(LEDGER_ENTRY_CONTRACT_DATA);
    w.sc_address_contract(contract_id);
    w.u32(SCV_LEDGER_KEY_CONTRACT_INSTANCE);
    w.u32(Durability::Persistent as u32);
    BASE64.encode(w.into_bytes())
}

/// `LedgerKey::ContractData` for the temporary `("Block", index)` entry,
/// base64.
pub fn block_entry_key(contract_id: &[u8; 32], index: u32) -> String {
    let mut w = XdrWriter::new();
    w.u32(LEDGER_ENTRY_CONTRACT_DATA);
    w.sc_address_contract(contract_id);
    // ScVal::Vec(Some([Symbol("Block"), U32(index)]))
    w.u32(SCV_VEC).u32(1).u32(2);
    w.scv_symbol("Block");
    w.scv_u32(index);
    w.u32(Durability::Temporary as u32);
    BASE64.encode(w.into_bytes())
}

/// `LedgerKey::Account` for an ed25519 account, base64.
pub fn account_key(public_key: &[u8; 32]) -> String {
    let mut w = XdrWriter::new();
    w.u32(LEDGER_ENTRY_ACCOUNT);
    w.account_id(public_key);
    BASE64.encode(w.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_are_big_endian() {
        let mut w = XdrWriter::new();
        w.u32(42).i64(-1).u64(1);
        assert_eq!(
            w.into_bytes(),
            [
                0, 0, 0, 42, //
                0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, //
                0, 0, 0, 0, 0, 0, 0, 1,
            ]
        );
    }

    #[test]
    fn var_bytes_padded_to_four() {
        let mut w = XdrWriter::new();
        w.bytes_var(&[0xab, 0xcd, 0xef]);
        assert_eq!(w.into_bytes(), [0, 0, 0, 3, 0xab, 0xcd, 0xef, 0]);
    }

    #[test]
    fn aligned_bytes_not_padded() {
        let mut w = XdrWriter::new();
        w.bytes_var(&[1, 2, 3, 4]);
        assert_eq!(w.into_bytes(), [0, 0, 0, 4, 1, 2, 3, 4]);
    }

    #[test]
    fn symbol_encoding() {
        let mut w = XdrWriter::new();
        w.scv_symbol("Block");
        assert_eq!(w.into_bytes(), [0, 0, 0, 15, 0, 0, 0, 5, b'B', b'l', b'o', b'c', b'k', 0, 0, 0]);
    }

    #[test]
    fn block_entry_key_layout() {
        use base64::engine::general_purpose::STANDARD as BASE64;
        use base64::Engine;

        let contract = [0x11u8; 32];
        let decoded = BASE64.decode(block_entry_key(&contract, 42)).unwrap();

        let mut expected = XdrWriter::new();
        expected.u32(6); // contract data entry
        expected.u32(1).bytes_fixed(&contract); // ScAddress::Contract
        expected.u32(16).u32(1).u32(2); // vec, present, 2 elements
        expected.scv_symbol("Block");
        expected.scv_u32(42);
        expected.u32(0); // temporary
        assert_eq!(decoded, expected.into_bytes());
    }

    #[test]
    fn account_key_layout() {
        use base64::engine::general_purpose::STANDARD as BASE64;
        use base64::Engine;

        let pk = [0x22u8; 32];
        let decoded = BASE64.decode(account_key(&pk)).unwrap();
        assert_eq!(&decoded[..8], [0, 0, 0, 0, 0, 0, 0, 0]); // account entry + ed25519 key type
        assert_eq!(&decoded[8..], pk);
    }
}
