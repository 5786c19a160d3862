//! 执行策略合约：只有传输层不可达才触发本地回退，业务错误永不回退。

#[path = "../support/mod.rs"]
mod support;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use spark_invoke::error::CodecStage;
use spark_invoke::{
    CodecError, EndpointRegistry, HandlerError, InvocationConfig, InvokeError, Invoker, JsonWireCodec,
    RegistrationTable, ServiceConfig, StrategyKind, Value, WireCodec,
};
use support::{Script, ScriptedRemote, counting, endpoint, failing, text_of};
use tracing_test::traced_test;

const PATH: &str = "/points/redeem";

fn invoker_with(strategy: StrategyKind, remote: ScriptedRemote, hits: Arc<AtomicUsize>) -> Invoker {
    Invoker::builder()
        .registry(
            EndpointRegistry::from_table(
                RegistrationTable::new().endpoint("points", endpoint(PATH, counting("local", hits))),
            )
            .unwrap(),
        )
        .config(InvocationConfig::default().with_service("points", ServiceConfig::default().with_strategy(strategy)))
        .remote(remote)
        .build()
}

#[test]
#[traced_test]
fn remote_first_falls_back_only_when_unavailable() {
    let hits = Arc::new(AtomicUsize::new(0));
    let remote = ScriptedRemote::new(Script::Unavailable);
    let invoker = invoker_with(StrategyKind::RemoteFirst, remote.clone(), hits.clone());

    let value = invoker.invoke("points", PATH, "2.0.0", vec![]).unwrap();
    assert_eq!(text_of(&value), "local");
    assert_eq!(remote.calls(), 1);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(logs_contain("falling back to local handler"));
}

#[test]
fn remote_first_never_falls_back_on_business_rejection() {
    let hits = Arc::new(AtomicUsize::new(0));
    let remote = ScriptedRemote::new(Script::Reject("E_LIMIT"));
    let invoker = invoker_with(StrategyKind::RemoteFirst, remote.clone(), hits.clone());

    let err = invoker.invoke("points", PATH, "2.0.0", vec![]).unwrap_err();
    match err {
        InvokeError::RemoteError { code, service, .. } => {
            assert_eq!(code, "E_LIMIT");
            assert_eq!(service, "points");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(hits.load(Ordering::SeqCst), 0, "本地 Handler 不应执行");
}

#[test]
fn remote_first_returns_remote_reply_when_available() {
    let hits = Arc::new(AtomicUsize::new(0));
    let remote = ScriptedRemote::new(Script::Reply("remote"));
    let invoker = invoker_with(StrategyKind::RemoteFirst, remote.clone(), hits.clone());
    let value = invoker.invoke("points", PATH, "2.0.0", vec![Value::from(5i64)]).unwrap();
    assert_eq!(text_of(&value), "remote");
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    let seen = remote.seen();
    assert_eq!(seen[0].path, PATH);
    assert_eq!(seen[0].client_version, "2.0.0");
    assert_eq!(seen[0].args, [Value::Int(5)]);
}

#[test]
fn remote_only_surfaces_unavailability() {
    let hits = Arc::new(AtomicUsize::new(0));
    let invoker = invoker_with(
        StrategyKind::RemoteOnly,
        ScriptedRemote::new(Script::Unavailable),
        hits.clone(),
    );
    let err = invoker.invoke("points", PATH, "2.0.0", vec![]).unwrap_err();
    assert!(matches!(err, InvokeError::RemoteUnavailable { .. }));
    assert!(err.is_infrastructure());
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[test]
fn failed_fallback_surfaces_the_local_error() {
    let invoker = Invoker::builder()
        .registry(
            EndpointRegistry::from_table(
                RegistrationTable::new().endpoint(
                    "points",
                    endpoint(PATH, failing("ledger locked")).with_strategy(StrategyKind::RemoteFirst),
                ),
            )
            .unwrap(),
        )
        .remote(ScriptedRemote::new(Script::Unavailable))
        .build();

    let err = invoker.invoke("points", PATH, "2.0.0", vec![]).unwrap_err();
    let InvokeError::Handler(handler) = err else {
        panic!("应返回本地 Handler 错误");
    };
    assert_eq!(handler.to_string(), "ledger locked");
}

#[test]
fn unconfigured_transport_counts_as_unavailable() {
    let hits = Arc::new(AtomicUsize::new(0));
    let invoker = Invoker::builder()
        .registry(
            EndpointRegistry::from_table(
                RegistrationTable::new().endpoint(
                    "points",
                    endpoint(PATH, counting("local", hits.clone())).with_strategy(StrategyKind::RemoteFirst),
                ),
            )
            .unwrap(),
        )
        .build();
    assert_eq!(text_of(&invoker.invoke("points", PATH, "2.0.0", vec![]).unwrap()), "local");
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[derive(Debug, thiserror::Error)]
#[error("points ledger is frozen")]
struct LedgerFrozen;

#[test]
fn local_only_preserves_the_original_handler_error() {
    let invoker = Invoker::builder()
        .registry(
            EndpointRegistry::from_table(RegistrationTable::new().endpoint(
                "points",
                endpoint(PATH, |_: &[Value]| -> Result<Value, HandlerError> {
                    Err(HandlerError::new(LedgerFrozen))
                }),
            ))
            .unwrap(),
        )
        .build();
    let err = invoker.invoke("points", PATH, "2.0.0", vec![]).unwrap_err();
    let InvokeError::Handler(handler) = &err else {
        panic!("应保留 Handler 变体");
    };
    assert!(handler.downcast_ref::<LedgerFrozen>().is_some());
    assert!(!err.is_infrastructure());
}

#[test]
fn simulated_remote_round_trips_arguments_and_result() {
    let invoker = Invoker::builder()
        .registry(
            EndpointRegistry::from_table(RegistrationTable::new().endpoint(
                "points",
                endpoint(PATH, |args: &[Value]| -> Result<Value, HandlerError> {
                    let total: i64 = args.iter().filter_map(Value::as_int).sum();
                    Ok(Value::from(total))
                })
                .with_strategy(StrategyKind::SimulatedRemote),
            ))
            .unwrap(),
        )
        .build();
    let total = invoker
        .invoke("points", PATH, "2.0.0", vec![Value::from(2i64), Value::from(3i64)])
        .unwrap();
    assert_eq!(total, Value::Int(5));
}

struct BrokenCodec;

impl WireCodec for BrokenCodec {
    fn name(&self) -> &'static str {
        "broken"
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>, CodecError> {
        JsonWireCodec.encode(value)
    }

    fn decode(&self, _: &[u8]) -> Result<Value, CodecError> {
        Err(CodecError::new("broken", CodecStage::Decode, "truncated frame"))
    }
}

#[test]
fn simulated_remote_reports_codec_failures() {
    let hits = Arc::new(AtomicUsize::new(0));
    let invoker = Invoker::builder()
        .registry(
            EndpointRegistry::from_table(RegistrationTable::new().endpoint(
                "points",
                endpoint(PATH, counting("local", hits.clone())).with_strategy(StrategyKind::SimulatedRemote),
            ))
            .unwrap(),
        )
        .codec(BrokenCodec)
        .build();
    let err = invoker.invoke("points", PATH, "2.0.0", vec![]).unwrap_err();
    assert_eq!(err.code(), "invoke.codec.failed");
    assert_eq!(hits.load(Ordering::SeqCst), 0, "参数解码失败时不应执行 Handler");
}
