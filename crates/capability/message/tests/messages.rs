use bigdecimal::BigDecimal;
use kpi_message::{ValidationError, parse, validate};
use serde_json::{Value, json};

fn reference() -> Value {
    json!({
        "sourceId": "pump-1",
        "timestamp": 1_690_000_000_000_i64,
        "kpis": [
            { "name": "temp", "unit": 1, "value": 72.5 },
            { "name": "flow", "unit": 3, "value": 12 }
        ]
    })
}

fn without(path: &[&str]) -> Vec<u8> {
    let mut document = reference();
    let (last, parents) = path.split_last().expect("path");
    let mut cursor = &mut document;
    for segment in parents {
        cursor = match segment.parse::<usize>() {
            Ok(index) => &mut cursor[index],
            Err(_) => &mut cursor[*segment],
        };
    }
    cursor
        .as_object_mut()
        .expect("object")
        .remove(*last)
        .expect("field present");
    serde_json::to_vec(&document).expect("serialise")
}

#[test]
fn missing_required_fields_are_rejected() {
    let cases: &[&[&str]] = &[
        &["sourceId"],
        &["timestamp"],
        &["kpis"],
        &["kpis", "0", "name"],
        &["kpis", "1", "unit"],
        &["kpis", "0", "value"],
    ];
    for path in cases {
        let payload = without(path);
        let err = validate(&payload).expect_err("rejected");
        let expected = format!("${}", render(path));
        assert!(
            err.violations()
                .iter()
                .any(|violation| violation.starts_with(&expected)),
            "{expected} not in {err}"
        );
    }
}

fn render(path: &[&str]) -> String {
    path.iter()
        .map(|segment| match segment.parse::<usize>() {
            Ok(index) => format!("[{index}]"),
            Err(_) => format!(".{segment}"),
        })
        .collect()
}

#[test]
fn empty_kpis_fail_validation() {
    let payload = br#"{"sourceId":"pump-1","timestamp":1690000000000,"kpis":[]}"#;
    assert_eq!(
        validate(payload),
        Err(ValidationError::Violations(vec![
            "$.kpis: must contain at least one item".to_string()
        ]))
    );
}

#[test]
fn validated_payload_parses() {
    let payload = serde_json::to_vec(&reference()).expect("serialise");
    validate(&payload).expect("valid");
    let message = parse(&payload).expect("parsed");
    assert_eq!(message.readings.len(), 2);
    assert_eq!(message.readings[1].value.to_string(), "12");
}

#[test]
fn arbitrary_precision_values_pass_validation_and_parsing() {
    for literal in [
        "1e-30",
        "0.12345678901234567890123456789",
        "1234567890123456789012345678901234567890",
    ] {
        let payload = format!(
            r#"{{"sourceId":"s","timestamp":1,"kpis":[{{"name":"n","unit":1,"value":{literal}}}]}}"#
        );
        assert_eq!(validate(payload.as_bytes()), Ok(()), "{literal}");
        let message = parse(payload.as_bytes()).expect(literal);
        assert_eq!(
            message.readings[0].value,
            literal.parse::<BigDecimal>().expect("decimal"),
            "{literal}"
        );
    }
}
