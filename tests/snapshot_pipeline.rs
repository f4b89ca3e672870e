use std::io::Cursor;
use std::time::Duration;
use tokio::time::Instant;

use balance_snapshot::csv_io::{parse_accounts, write_table};
use balance_snapshot::snapshot::mock::NATIVE_KEY;
use balance_snapshot::snapshot::{
    AppConfig, BalanceSnapshotEngine, BlockReference, MockLedger, RetryPolicy, SnapshotAssembler,
    SnapshotError, TokenRegistry,
};

const USDT: &str = "0xdac17f958d2ee523a2206206994597c13d831ec7";
const USDC: &str = "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48";
const DAI: &str = "0x6b175474e89094c44da98b954eedeac495271d0f";
const A: &str = "0x00000000000000000000000000000000000000aa";
const B: &str = "0x00000000000000000000000000000000000000bb";
const C: &str = "0x00000000000000000000000000000000000000cc";
const BLOCK: BlockReference = BlockReference(13_916_166);

fn config() -> AppConfig {
    let yaml = format!(
        r#"
rpc:
  url: "http://127.0.0.1:8545"
snapshot:
  input: "data/addresses.csv"
  output: "data/balances.csv"
  block: {block}
  tracked: ["USDT", "USDC", "DAI"]
  columns: ["USDT", "USDC", "ETH", "DAI"]
  retry:
    base_delay_ms: 5000
    max_delay_ms: 5000
    multiplier: 1
    max_attempts: null
tokens:
  USDT: {{ address: "{USDT}", decimals: 6 }}
  USDC: {{ address: "{USDC}", decimals: 6 }}
  DAI: {{ address: "{DAI}", decimals: 18 }}
"#,
        block = BLOCK.height()
    );
    AppConfig::from_yaml(&yaml).unwrap()
}

/// Account CSV in, snapshot CSV out, with the slowest account first.
#[tokio::test(start_paused = true)]
async fn test_end_to_end_keeps_input_order() {
    let config = config();
    let registry = TokenRegistry::from_entries(&config.tokens).unwrap();
    let tracked = config.snapshot.tracked.as_slice();

    let input = format!("address\n{}\n{}\n{}\n", A.to_uppercase().replace("0X", "0x"), B, C);
    let accounts = parse_accounts(Cursor::new(input), "addresses.csv").unwrap();

    // A's queries finish last, B's first, C's in between; one USDC call flakes.
    let ledger = MockLedger::new()
        .expect_block(BLOCK)
        .with_token(USDT, A, 1_500_000u64)
        .with_token(DAI, A, 2_000_000_000_000_000_000u64)
        .with_native(A, 500_000_000_000_000_000u64)
        .with_token(USDC, B, 123_456_789u64)
        .with_native(C, 1u64)
        .with_delay(A, USDT, Duration::from_secs(40))
        .with_delay(A, DAI, Duration::from_secs(35))
        .with_delay(A, NATIVE_KEY, Duration::from_secs(30))
        .with_delay(C, NATIVE_KEY, Duration::from_secs(3))
        .with_transient_failures(C, USDC, 2);

    let engine = BalanceSnapshotEngine::new(&ledger, &registry)
        .with_policy(config.snapshot.retry.policy());
    let mut ticks = 0usize;
    let snapshot = engine.run(&accounts, tracked, BLOCK, &mut ticks).await.unwrap();
    assert_eq!(ticks, 3);

    let assembler = SnapshotAssembler::with_order(
        &config.snapshot.native_symbol,
        tracked,
        config.snapshot.columns.as_deref().unwrap(),
    )
    .unwrap();
    let table = assembler.assemble(&snapshot).unwrap();

    let mut out = Vec::new();
    write_table(&mut out, &table).unwrap();
    let expected = format!(
        "address,USDT,USDC,ETH,DAI\n\
         {A},1.5,0.0,0.5,2.0\n\
         {B},0.0,123.456789,0.0,0.0\n\
         {C},0.0,0.0,0.000000000000000001,0.0\n"
    );
    assert_eq!(String::from_utf8(out).unwrap(), expected);

    // 3 accounts x (3 tokens + native) plus two retried USDC calls
    assert_eq!(ledger.calls(), 3 * 4 + 2);
}

#[tokio::test]
async fn test_unknown_symbol_is_configuration_error_without_remote_calls() {
    let config = config();
    let registry = TokenRegistry::from_entries(&config.tokens).unwrap();
    let ledger = MockLedger::new();
    let engine = BalanceSnapshotEngine::new(&ledger, &registry);

    let accounts = parse_accounts(Cursor::new(format!("address\n{}\n", A)), "in").unwrap();
    let err = engine
        .run(&accounts, &["USDT", "FOO"], BLOCK, &mut 0usize)
        .await
        .unwrap_err();

    assert!(matches!(err, SnapshotError::UnknownSymbol(ref s) if s == "FOO"));
    assert!(err.is_configuration());
    assert_eq!(ledger.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_malformed_account_fails_fast_instead_of_hanging() {
    let config = config();
    let registry = TokenRegistry::from_entries(&config.tokens).unwrap();
    let ledger = MockLedger::new().with_permanent_failure(B);
    let engine = BalanceSnapshotEngine::new(&ledger, &registry)
        .with_policy(RetryPolicy::fixed(Duration::from_secs(5)));

    let accounts = parse_accounts(Cursor::new(format!("address\n{}\n{}\n", A, B)), "in").unwrap();
    let start = Instant::now();
    let mut ticks = 0usize;
    let err = engine
        .run(&accounts, &["DAI"], BLOCK, &mut ticks)
        .await
        .unwrap_err();

    assert!(matches!(err, SnapshotError::Permanent { ref account, .. } if account == B));
    assert_eq!(ticks, 1);
    // no backoff pause was taken and nothing was re-sent
    assert_eq!(start.elapsed(), Duration::ZERO);
    assert!(ledger.calls() <= 4);
}

#[test]
fn test_shipped_configs_are_consistent() {
    for path in [
        "config/snapshot.yaml",
        "config/snapshot_v1.yaml",
        "config/snapshot_v2.yaml",
        "config/snapshot_v3.yaml",
    ] {
        let config = AppConfig::from_file(path).unwrap();
        let registry = TokenRegistry::from_entries(&config.tokens).unwrap();
        let tracked = config.snapshot.tracked.as_slice();

        assert_eq!(registry.resolve(tracked).unwrap().len(), tracked.len(), "{}", path);
        let assembler = SnapshotAssembler::with_order(
            &config.snapshot.native_symbol,
            tracked,
            config.snapshot.columns.as_deref().unwrap(),
        )
        .unwrap();
        assert_eq!(assembler.header()[0], "address");
        assert_eq!(assembler.header().len(), tracked.len() + 2, "{}", path);

        // every shipped config keeps retrying transient errors
        assert_eq!(config.snapshot.retry.max_attempts, None, "{}", path);
    }
}

#[test]
fn test_broad_market_config_column_layout() {
    let config = AppConfig::from_file("config/snapshot_v1.yaml").unwrap();
    let tracked = config.snapshot.tracked.as_slice();
    let assembler = SnapshotAssembler::with_order(
        &config.snapshot.native_symbol,
        tracked,
        config.snapshot.columns.as_deref().unwrap(),
    )
    .unwrap();

    let header = assembler.header();
    assert_eq!(tracked.len(), 57);
    assert_eq!(&header[..5], ["address", "USDT", "USDC", "ETH", "FTM"]);
    assert_eq!(header.last().map(String::as_str), Some("JFIN"));

    let registry = TokenRegistry::from_entries(&config.tokens).unwrap();
    assert_eq!(registry.describe("USDT").unwrap().decimals, 6);
    assert_eq!(registry.describe("CRO").unwrap().decimals, 8);
    assert_eq!(registry.describe("DAI").unwrap().decimals, 18);
}
