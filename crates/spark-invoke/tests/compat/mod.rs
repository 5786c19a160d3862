//! 多版本兼容合约：旧版本客户端的请求经过滤升级为规范形状，响应再降级回旧形状。
//!
//! 场景：0.8.2 版本的收银客户端以 `{"customerId": "1234"}` 发起会员注册，
//! 规范模型已演进为 `CustomerRequest { customerModel: { customerId } }`，
//! 响应中新增了 `customerAccounts`，旧客户端只认识 `loyaltyCustomerId`。

#[path = "../support/mod.rs"]
mod support;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::json;
use spark_invoke::filter::{request_typed, response_typed};
use spark_invoke::{
    BoxError, ClientVersion, Direction, EndpointRegistry, FilterDescriptor, FilterPipeline, HandlerError,
    InvocationConfig, InvokeError, Invoker, Record, RegistrationTable, ServiceConfig, StrategyKind, TypeTag, Value,
    VersionRange,
};
use support::endpoint;

const ENROLL: &str = "/customer/enroll";

const LEGACY_CUSTOMER_REQUEST: TypeTag = TypeTag::from_static("LegacyCustomerRequest");
const CUSTOMER_REQUEST: TypeTag = TypeTag::from_static("CustomerRequest");
const CUSTOMER_RESPONSE: TypeTag = TypeTag::from_static("CustomerResponse");
const LEGACY_CUSTOMER_RESPONSE: TypeTag = TypeTag::from_static("LegacyCustomerResponse");
const CUSTOMER_ACCOUNT: TypeTag = TypeTag::from_static("CustomerAccount");
const REWARD_LINE: TypeTag = TypeTag::from_static("RewardLine");
const LEGACY_REWARD_LINE: TypeTag = TypeTag::from_static("LegacyRewardLine");

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyCustomerRequest {
    customer_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CustomerRequest {
    customer_model: CustomerModel,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CustomerModel {
    customer_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CustomerResponse {
    customer: CustomerView,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CustomerView {
    customer_id: String,
}

/// 0.8.x 客户端中的响应类型，未知字段即视为不兼容。
#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct LegacyCustomerResponse {
    loyalty_customer_id: String,
}

fn legacy_filters() -> FilterPipeline {
    let before_2_0 = VersionRange::less_than("2.0").unwrap();
    FilterPipeline::new()
        .with_filter(
            request_typed(
                "legacy-customer-request",
                LEGACY_CUSTOMER_REQUEST,
                CUSTOMER_REQUEST,
                |old: LegacyCustomerRequest| -> Result<CustomerRequest, BoxError> {
                    Ok(CustomerRequest {
                        customer_model: CustomerModel {
                            customer_id: old.customer_id,
                        },
                    })
                },
            )
            .on_path(ENROLL)
            .within(before_2_0.clone()),
        )
        .with_filter(
            response_typed(
                "legacy-customer-response",
                CUSTOMER_RESPONSE,
                LEGACY_CUSTOMER_RESPONSE,
                |response: CustomerResponse| -> Result<LegacyCustomerResponse, BoxError> {
                    Ok(LegacyCustomerResponse {
                        loyalty_customer_id: response.customer.customer_id,
                    })
                },
            )
            .on_path(ENROLL)
            .within(before_2_0),
        )
}

fn enroll_handler(hits: Arc<AtomicUsize>) -> impl Fn(&[Value]) -> Result<Value, HandlerError> + Send + Sync + 'static {
    move |args: &[Value]| {
        hits.fetch_add(1, Ordering::SeqCst);
        let request = args
            .first()
            .and_then(Value::as_record)
            .filter(|record| record.tag() == &CUSTOMER_REQUEST)
            .ok_or_else(|| HandlerError::msg("expected a canonical CustomerRequest"))?;
        let customer_id = request
            .record("customerModel")
            .and_then(|model| model.text("customerId"))
            .ok_or_else(|| HandlerError::msg("customerModel.customerId is required"))?;

        let account = Record::new(CUSTOMER_ACCOUNT)
            .with("accountId", format!("acct-{customer_id}"))
            .with("balance", 0i64);
        Ok(Value::from(
            Record::new(CUSTOMER_RESPONSE)
                .with(
                    "customer",
                    Record::new(TypeTag::from_static("Customer"))
                        .with("customerId", customer_id)
                        .with("loyaltyId", format!("L-{customer_id}")),
                )
                .with("customerAccounts", vec![Value::from(account)]),
        ))
    }
}

fn invoker(filters: FilterPipeline, strategy: StrategyKind, hits: Arc<AtomicUsize>) -> Invoker {
    Invoker::builder()
        .registry(
            EndpointRegistry::from_table(
                RegistrationTable::new().endpoint("loyalty", endpoint(ENROLL, enroll_handler(hits))),
            )
            .unwrap(),
        )
        .filters(filters)
        .config(InvocationConfig::default().with_service("loyalty", ServiceConfig::default().with_strategy(strategy)))
        .build()
}

fn legacy_request() -> Value {
    Value::from(Record::from_json(LEGACY_CUSTOMER_REQUEST, json!({"customerId": "1234"})).unwrap())
}

#[test]
fn legacy_client_round_trips_through_canonical_model() {
    let hits = Arc::new(AtomicUsize::new(0));
    let invoker = invoker(legacy_filters(), StrategyKind::LocalOnly, hits.clone());

    let response = invoker.invoke("loyalty", ENROLL, "0.8.2", vec![legacy_request()]).unwrap();
    let wire = response.to_json();
    assert_eq!(wire, json!({"loyaltyCustomerId": "1234"}));
    assert!(wire.get("customerAccounts").is_none());

    let parsed: LegacyCustomerResponse = serde_json::from_value(wire).expect("旧客户端应能解析");
    assert_eq!(
        parsed,
        LegacyCustomerResponse {
            loyalty_customer_id: "1234".to_owned()
        }
    );
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn legacy_round_trip_survives_simulated_wire_hop() {
    let hits = Arc::new(AtomicUsize::new(0));
    let invoker = invoker(legacy_filters(), StrategyKind::SimulatedRemote, hits);
    let response = invoker.invoke("loyalty", ENROLL, "v0.8.2", vec![legacy_request()]).unwrap();
    assert_eq!(response.to_json(), json!({"loyaltyCustomerId": "1234"}));
}

#[test]
fn every_client_below_the_bound_is_downgraded() {
    let hits = Arc::new(AtomicUsize::new(0));
    let invoker = invoker(legacy_filters(), StrategyKind::LocalOnly, hits);
    for version in ["0.8.2", "1.9.9", "1.9.9+build.4"] {
        let response = invoker.invoke("loyalty", ENROLL, version, vec![legacy_request()]).unwrap();
        assert_eq!(response.to_json(), json!({"loyaltyCustomerId": "1234"}), "client {version}");
    }
}

#[test]
fn current_client_sees_canonical_response() {
    let hits = Arc::new(AtomicUsize::new(0));
    let invoker = invoker(legacy_filters(), StrategyKind::LocalOnly, hits);
    let request = Value::from(
        Record::from_json(CUSTOMER_REQUEST, json!({"customerModel": {"customerId": "77"}})).unwrap(),
    );
    let response = invoker.invoke("loyalty", ENROLL, "2.0", vec![request]).unwrap();
    let wire = response.to_json();
    assert_eq!(wire["customer"]["customerId"], "77");
    assert_eq!(wire["customer"]["loyaltyId"], "L-77");
    assert_eq!(wire["customerAccounts"][0]["accountId"], "acct-77");
}

#[test]
fn unknown_version_gets_no_bounded_filters() {
    let hits = Arc::new(AtomicUsize::new(0));
    let invoker = invoker(legacy_filters(), StrategyKind::LocalOnly, hits);
    let err = invoker
        .invoke("loyalty", ENROLL, ClientVersion::Unknown, vec![legacy_request()])
        .unwrap_err();
    assert!(matches!(err, InvokeError::Handler(_)));
    assert_eq!(err.to_string(), "expected a canonical CustomerRequest");
}

fn downgrade_reward_line(line: Record) -> Result<Record, BoxError> {
    let points = line.get("points").and_then(Value::as_int).ok_or("points missing")?;
    Ok(Record::new(LEGACY_REWARD_LINE).with("pts", points))
}

#[test]
fn nested_records_are_replaced_at_any_depth() {
    let pipeline = FilterPipeline::new().with_filter(
        FilterDescriptor::response("legacy-reward-line", REWARD_LINE, LEGACY_REWARD_LINE, downgrade_reward_line)
            .within(VersionRange::less_than("1.0.0").unwrap()),
    );
    let history = Value::from(
        Record::new(TypeTag::from_static("OrderHistory")).with(
            "orders",
            vec![Value::from(
                Record::new(TypeTag::from_static("Order"))
                    .with("id", "o-1")
                    .with("bonus", Record::new(REWARD_LINE).with("points", 5i64))
                    .with(
                        "lines",
                        vec![
                            Value::from(Record::new(REWARD_LINE).with("points", 10i64)),
                            Value::from(Record::new(REWARD_LINE).with("points", 20i64)),
                        ],
                    ),
            )],
        ),
    );

    let legacy = pipeline
        .run(Direction::Response, "/orders/history", &ClientVersion::from("0.9.1"), history.clone())
        .unwrap();
    assert_eq!(
        legacy.to_json(),
        json!({"orders": [{"id": "o-1", "bonus": {"pts": 5}, "lines": [{"pts": 10}, {"pts": 20}]}]})
    );

    let current = pipeline
        .run(Direction::Response, "/orders/history", &ClientVersion::from("1.1.0"), history.clone())
        .unwrap();
    assert_eq!(current, history);
}

#[test]
fn response_filter_failure_discards_the_result() {
    let hits = Arc::new(AtomicUsize::new(0));
    let broken = legacy_filters().with_filter(
        FilterDescriptor::response(
            "broken-account-filter",
            CUSTOMER_ACCOUNT,
            CUSTOMER_ACCOUNT,
            |_: Record| -> Result<Record, BoxError> { Err("account schema unavailable".into()) },
        )
        .on_path(ENROLL),
    );
    let invoker = invoker(broken, StrategyKind::LocalOnly, hits.clone());

    let err = invoker
        .invoke("loyalty", ENROLL, "2.3.0", vec![Value::from(
            Record::from_json(CUSTOMER_REQUEST, json!({"customerModel": {"customerId": "9"}})).unwrap(),
        )])
        .unwrap_err();
    let InvokeError::Filter(filter_error) = &err else {
        panic!("应返回过滤错误: {err}");
    };
    assert_eq!(filter_error.filter(), "broken-account-filter");
    assert_eq!(filter_error.direction(), Direction::Response);
    assert_eq!(filter_error.path(), ENROLL);
    assert_eq!(hits.load(Ordering::SeqCst), 1, "Handler 已执行，过滤失败仍需上报");
}
