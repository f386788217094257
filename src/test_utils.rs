use crate::{
    sponsored_evm, PackageSignature, Secp256k1Recovery, SponsoredConfig, SponsoredContext,
    SponsoredPackage, SPONSORED_TX_TYPE,
};
use k256::ecdsa::SigningKey;
use revm::{
    db::InMemoryDB,
    interpreter::opcode::*,
    primitives::{
        address, keccak256, AccountInfo, Address, Bytecode, Bytes, ResultAndState, SpecId, TxKind,
        B256, KECCAK_EMPTY, U256,
    },
    Evm,
};

pub const SPONSEE_KEY: [u8; 32] = [0x11; 32];
pub const OTHER_KEY: [u8; 32] = [0x22; 32];

/// Sends the transaction and pays for gas.
pub const SPONSOR: Address = address!("000000000000000000000000000000000000dead");
/// Holds the invoker code built by [`invoker_code`].
pub const INVOKER: Address = address!("00000000000000000000000000000000000a11ce");
/// Calls [`INVOKER`] through `STATICCALL`.
pub const STATIC_CALLER: Address = address!("00000000000000000000000000000000000057a7");
/// Returns [`RETURN_WORD`].
pub const TARGET: Address = address!("00000000000000000000000000000000000ca11e");
/// Reverts with [`RETURN_WORD`].
pub const REVERTER: Address = address!("000000000000000000000000000000000000bad0");
/// Stores `CALLER` in slot 0, `CALLVALUE` in slot 1 and returns `CALLER`.
pub const RECORDER: Address = address!("000000000000000000000000000000000000c0de");
/// Returns two words, [`RETURN_WORD`] and `0x2b`.
pub const LONG_RETURNER: Address = address!("00000000000000000000000000000000000010e6");
/// Returns the eight bytes of [`SHORT_RETURN`].
pub const SHORT_RETURNER: Address = address!("0000000000000000000000000000000000005407");

pub const RETURN_WORD: U256 = U256::from_limbs([0x2a, 0, 0, 0]);
pub const SHORT_RETURN: u64 = 0x1122334455667788;
pub const TX_GAS_LIMIT: u64 = 1_000_000;

/// Memory offset of the invoker's return window.
const RET_OFFSET: u16 = 0x0400;
/// Memory offset of the five words the invoker returns.
const OUT_OFFSET: u16 = 0x0600;

/// Returns the address controlled by `key`.
pub fn key_address(key: [u8; 32]) -> Address {
    let signing_key = SigningKey::from_slice(&key).expect("valid secret key");
    let point = signing_key.verifying_key().to_encoded_point(false);
    Address::from_slice(&keccak256(&point.as_bytes()[1..])[12..])
}

/// Signs `digest` with `key` and returns the signer with a low-s signature.
pub fn sign_digest(key: [u8; 32], digest: B256) -> (Address, PackageSignature) {
    let signing_key = SigningKey::from_slice(&key).expect("valid secret key");
    let (mut signature, recid) =
        signing_key.sign_prehash_recoverable(digest.as_slice()).expect("signing succeeds");
    let mut v = recid.to_byte();
    if let Some(normalized) = signature.normalize_s() {
        signature = normalized;
        v ^= 1;
    }

    let bytes = signature.to_bytes();
    let signature = PackageSignature::new(
        v,
        B256::from_slice(&bytes[..32]),
        B256::from_slice(&bytes[32..]),
    );
    (key_address(key), signature)
}

/// Returns a sponsored package without sponsee or signature.
pub fn unsigned_package(to: Address, value: U256, mingas: u64, data: Bytes) -> SponsoredPackage {
    SponsoredPackage {
        tx_type: SPONSORED_TX_TYPE,
        to,
        value,
        mingas: U256::from(mingas),
        data,
        ..Default::default()
    }
}

/// Signs `package` with `key` for `invoker` on `chain_id` and sets the sponsee to the signer.
pub fn sign_package(
    key: [u8; 32],
    invoker: Address,
    chain_id: u64,
    mut package: SponsoredPackage,
) -> SponsoredPackage {
    let (sponsee, signature) = sign_digest(key, package.signing_digest(invoker, chain_id));
    package.sponsee = sponsee;
    package.signature = signature;
    package
}

fn push32(code: &mut Vec<u8>, word: U256) {
    code.push(PUSH32);
    code.extend_from_slice(&word.to_be_bytes::<32>());
}

fn push2(code: &mut Vec<u8>, word: u16) {
    code.push(PUSH2);
    code.extend_from_slice(&word.to_be_bytes());
}

/// Invoker contract: runs `TXCALL` with `gas` and `value` over its whole calldata and a one
/// word return window, then returns five words: `success`, `calleeSuccess`, the return window,
/// `RETURNDATASIZE` and the word right after the return window.
pub fn invoker_code(gas: U256, value: U256) -> Bytes {
    let mut code = vec![CALLDATASIZE, PUSH1, 0x00, PUSH1, 0x00, CALLDATACOPY];
    // retLength, retOffset, argsLength, argsOffset, value, gas
    code.extend_from_slice(&[PUSH1, 0x20]);
    push2(&mut code, RET_OFFSET);
    code.extend_from_slice(&[CALLDATASIZE, PUSH1, 0x00]);
    push32(&mut code, value);
    push32(&mut code, gas);
    code.push(crate::TXCALL);
    // calleeSuccess is on top.
    push2(&mut code, OUT_OFFSET + 0x20);
    code.push(MSTORE);
    push2(&mut code, OUT_OFFSET);
    code.push(MSTORE);
    push2(&mut code, RET_OFFSET);
    code.push(MLOAD);
    push2(&mut code, OUT_OFFSET + 0x40);
    code.push(MSTORE);
    code.push(RETURNDATASIZE);
    push2(&mut code, OUT_OFFSET + 0x60);
    code.push(MSTORE);
    push2(&mut code, RET_OFFSET + 0x20);
    code.push(MLOAD);
    push2(&mut code, OUT_OFFSET + 0x80);
    code.push(MSTORE);
    code.extend_from_slice(&[PUSH1, 0xa0]);
    push2(&mut code, OUT_OFFSET);
    code.push(RETURN);
    code.into()
}

/// Forwards its calldata to [`INVOKER`] through `STATICCALL` and returns the five words of
/// the result.
pub fn static_caller_code() -> Bytes {
    let mut code = vec![CALLDATASIZE, PUSH1, 0x00, PUSH1, 0x00, CALLDATACOPY];
    // retSize, retOffset, argsSize, argsOffset, address, gas
    code.extend_from_slice(&[PUSH1, 0xa0, PUSH1, 0x00, CALLDATASIZE, PUSH1, 0x00, PUSH20]);
    code.extend_from_slice(INVOKER.as_slice());
    code.extend_from_slice(&[GAS, STATICCALL, POP, PUSH1, 0xa0, PUSH1, 0x00, RETURN]);
    code.into()
}

fn returner_code(halt: u8) -> Bytes {
    vec![PUSH1, 0x2a, PUSH1, 0x00, MSTORE, PUSH1, 0x20, PUSH1, 0x00, halt].into()
}

fn long_returner_code() -> Bytes {
    vec![
        PUSH1, 0x2a, PUSH1, 0x00, MSTORE, PUSH1, 0x2b, PUSH1, 0x20, MSTORE, PUSH1, 0x40, PUSH1,
        0x00, RETURN,
    ]
    .into()
}

fn short_returner_code() -> Bytes {
    let mut code = vec![PUSH8];
    code.extend_from_slice(&SHORT_RETURN.to_be_bytes());
    code.extend_from_slice(&[PUSH1, 0x00, MSTORE, PUSH1, 0x08, PUSH1, 0x18, RETURN]);
    code.into()
}

fn recorder_code() -> Bytes {
    vec![
        CALLER, PUSH1, 0x00, SSTORE, CALLVALUE, PUSH1, 0x01, SSTORE, CALLER, PUSH1, 0x00, MSTORE,
        PUSH1, 0x20, PUSH1, 0x00, RETURN,
    ]
    .into()
}

pub fn insert_code(db: &mut InMemoryDB, address: Address, code: Bytes) {
    let info = AccountInfo::new(U256::ZERO, 1, KECCAK_EMPTY, Bytecode::new_raw(code));
    db.insert_account_info(address, info);
}

/// Returns a database with a funded sponsor, the callees and an invoker running `TXCALL` with
/// `gas` and `value`.
pub fn db(gas: u64, value: U256) -> InMemoryDB {
    let mut db = InMemoryDB::default();
    db.insert_account_info(SPONSOR, AccountInfo::from_balance(U256::from(10u64.pow(18))));
    insert_code(&mut db, INVOKER, invoker_code(U256::from(gas), value));
    insert_code(&mut db, STATIC_CALLER, static_caller_code());
    insert_code(&mut db, TARGET, returner_code(RETURN));
    insert_code(&mut db, REVERTER, returner_code(REVERT));
    insert_code(&mut db, RECORDER, recorder_code());
    insert_code(&mut db, LONG_RETURNER, long_returner_code());
    insert_code(&mut db, SHORT_RETURNER, short_returner_code());
    db
}

/// Sets the balance of `address`, keeping its code.
pub fn fund(db: &mut InMemoryDB, address: Address, balance: U256) {
    let mut info =
        db.accounts.get(&address).map(|account| account.info.clone()).unwrap_or_default();
    info.balance = balance;
    db.insert_account_info(address, info);
}

/// External context with the default configuration.
pub fn sponsored_context() -> SponsoredContext {
    SponsoredContext::new(SponsoredConfig::new(), Secp256k1Recovery)
}

/// Words returned by [`invoker_code`].
#[derive(Debug, PartialEq, Eq)]
pub struct InvokerOutput {
    pub success: U256,
    pub callee_success: U256,
    pub returned_word: U256,
    pub return_data_size: U256,
    pub spill_word: U256,
}

impl InvokerOutput {
    pub fn result(&self) -> Option<crate::TxCallResult> {
        crate::TxCallResult::from_words(self.success, self.callee_success)
    }
}

/// Sends a transaction from [`SPONSOR`] to `to` with `data`.
pub fn transact_with<EXT>(
    mut evm: Evm<'_, EXT, InMemoryDB>,
    to: Address,
    data: Bytes,
) -> Result<ResultAndState, Box<dyn core::error::Error>> {
    let tx = evm.tx_mut();
    tx.caller = SPONSOR;
    tx.transact_to = TxKind::Call(to);
    tx.data = data;
    tx.gas_limit = TX_GAS_LIMIT;
    tx.gas_price = U256::ZERO;

    Ok(evm.transact()?)
}

/// Sends a transaction from [`SPONSOR`] to `to` with `data` on Cancun.
pub fn transact(
    db: InMemoryDB,
    to: Address,
    data: Bytes,
) -> Result<ResultAndState, Box<dyn core::error::Error>> {
    transact_with(sponsored_evm(db, sponsored_context(), SpecId::CANCUN), to, data)
}

/// Decodes the five words returned by [`invoker_code`].
pub fn invoker_output(result: &ResultAndState) -> InvokerOutput {
    assert!(result.result.is_success(), "invoker halted: {:?}", result.result);
    let output = result.result.output().expect("call output");
    let word = |i: usize| U256::from_be_slice(&output[i * 32..(i + 1) * 32]);
    InvokerOutput {
        success: word(0),
        callee_success: word(1),
        returned_word: word(2),
        return_data_size: word(3),
        spill_word: word(4),
    }
}

/// Returns the present value of `slot` of `address` if the transaction touched it.
pub fn storage(result: &ResultAndState, address: Address, slot: u64) -> Option<U256> {
    result
        .state
        .get(&address)
        .and_then(|account| account.storage.get(&U256::from(slot)))
        .map(|slot| slot.present_value)
}

/// Returns the balance of `address` after the transaction.
pub fn balance(result: &ResultAndState, address: Address) -> Option<U256> {
    result.state.get(&address).map(|account| account.info.balance)
}
