// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    navigation = { FailureKind::NavigationTimeout, true },
    probe = { FailureKind::ProbeTimeout, true },
    broker = { FailureKind::BrokerUnavailable, false },
    auth = { FailureKind::AuthFailed, false },
    unclassified = { FailureKind::UnclassifiedException, false },
)]
fn timeout_kinds(kind: FailureKind, expected: bool) {
    assert_eq!(kind.is_timeout(), expected);
}

#[test]
fn display_includes_kind_and_detail() {
    let err = FlowError::new(FailureKind::AuthFailed, "access_denied");
    assert_eq!(err.to_string(), "AuthFailed: access_denied");
}

#[test]
fn display_without_detail_is_bare_kind() {
    let err = FlowError::new(FailureKind::NoCredentials, "");
    assert_eq!(err.to_string(), "NoCredentials");
}

#[test]
fn anyhow_round_trip_keeps_classification() {
    let wrapped = anyhow::Error::new(FlowError::new(FailureKind::ProbeTimeout, "60s"));
    let back = FlowError::from(wrapped);
    assert_eq!(back.kind, FailureKind::ProbeTimeout);
    assert_eq!(back.detail, "60s");
}

#[test]
fn foreign_anyhow_error_is_unclassified() {
    let back = FlowError::from(anyhow::anyhow!("socket closed"));
    assert_eq!(back.kind, FailureKind::UnclassifiedException);
    assert!(back.detail.contains("socket closed"));
}

#[test]
fn kind_serializes_as_variant_name() -> anyhow::Result<()> {
    let json = serde_json::to_string(&FailureKind::BrokerUnavailable)?;
    assert_eq!(json, "\"BrokerUnavailable\"");
    Ok(())
}
