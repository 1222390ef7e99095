// Ledger state machine and payment validation

use chrono::NaiveDate;
use commission_tracker::core::AppError;
use commission_tracker::modules::installments::models::{
    Installment, InstallmentStatus, NewInstallment,
};
use commission_tracker::modules::installments::services::{
    InstallmentLedger, LedgerPolicy, NoOpReason, OverdueTransition, PaymentInput,
};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn installment(amount: Decimal) -> Installment {
    Installment::new(
        "plan-1",
        "agency-1",
        &NewInstallment {
            sequence_number: 1,
            amount,
            is_initial_payment: false,
            generates_commission: true,
            student_due_date: date(2025, 3, 1),
            college_due_date: date(2025, 3, 15),
        },
    )
    .unwrap()
}

fn payment(amount: Decimal) -> PaymentInput {
    PaymentInput {
        paid_date: date(2025, 3, 1),
        paid_amount: amount,
        notes: None,
    }
}

fn ledger() -> InstallmentLedger {
    InstallmentLedger::new(LedgerPolicy::default())
}

fn rejected_field(result: commission_tracker::core::Result<impl std::fmt::Debug>) -> &'static str {
    match result {
        Err(AppError::InvalidField { field, .. }) => field,
        other => panic!("expected a field error, got {:?}", other),
    }
}

#[test]
fn test_full_and_partial_payment() {
    let today = date(2025, 3, 2);
    let inst = installment(dec!(1000));

    let full = ledger().record_payment(&inst, &payment(dec!(1000)), today).unwrap();
    assert_eq!(full.current.status, InstallmentStatus::Paid);
    assert_eq!(full.current.paid_amount, Some(dec!(1000)));

    let partial = ledger().record_payment(&inst, &payment(dec!(500)), today).unwrap();
    assert_eq!(partial.current.status, InstallmentStatus::Partial);
    assert_eq!(partial.previous.status, InstallmentStatus::Pending);
}

#[test]
fn test_partial_then_paid() {
    let today = date(2025, 3, 2);
    let inst = installment(dec!(1000));

    let partial = ledger().record_payment(&inst, &payment(dec!(400)), today).unwrap();
    let paid = ledger()
        .record_payment(&partial.current, &payment(dec!(1000)), today)
        .unwrap();

    assert_eq!(paid.previous.status, InstallmentStatus::Partial);
    assert_eq!(paid.current.status, InstallmentStatus::Paid);
    assert_eq!(paid.current.paid_amount, Some(dec!(1000)));
}

#[test]
fn test_overdue_installment_accepts_late_payment() {
    let inst = installment(dec!(1000));
    let overdue = match InstallmentLedger::transition_to_overdue(&inst, date(2025, 3, 2)) {
        OverdueTransition::Applied(update) => update.current,
        other => panic!("expected transition, got {:?}", other),
    };

    let paid = ledger()
        .record_payment(&overdue, &payment(dec!(1000)), date(2025, 3, 10))
        .unwrap();
    assert_eq!(paid.current.status, InstallmentStatus::Paid);
}

#[test]
fn test_rejections_name_the_field() {
    let today = date(2025, 3, 1);
    let inst = installment(dec!(1000));

    let future = PaymentInput {
        paid_date: date(2025, 3, 2),
        ..payment(dec!(100))
    };
    assert_eq!(rejected_field(ledger().record_payment(&inst, &future, today)), "paid_date");
    assert_eq!(
        rejected_field(ledger().record_payment(&inst, &payment(Decimal::ZERO), today)),
        "paid_amount"
    );
    assert_eq!(
        rejected_field(ledger().record_payment(&inst, &payment(dec!(1100.01)), today)),
        "paid_amount"
    );

    let long_notes = PaymentInput {
        notes: Some("x".repeat(501)),
        ..payment(dec!(100))
    };
    assert_eq!(rejected_field(ledger().record_payment(&inst, &long_notes, today)), "notes");
}

#[test]
fn test_sub_cent_payment_is_rejected() {
    let today = date(2025, 3, 1);
    let inst = installment(dec!(1000));

    // 999.999 would be stored as 1000.00 next to a partial status
    assert_eq!(
        rejected_field(ledger().record_payment(&inst, &payment(dec!(999.999)), today)),
        "paid_amount"
    );
    assert_eq!(
        rejected_field(ledger().record_payment(&inst, &payment(dec!(0.001)), today)),
        "paid_amount"
    );

    let update = ledger()
        .record_payment(&inst, &payment(dec!(999.990)), today)
        .unwrap();
    assert_eq!(update.current.status, InstallmentStatus::Partial);
    assert!(update.current.check_payment_fields().is_ok());
}

#[test]
fn test_sub_cent_installment_amount_is_rejected() {
    let err = Installment::new(
        "plan-1",
        "agency-1",
        &NewInstallment {
            sequence_number: 1,
            amount: dec!(1000.005),
            is_initial_payment: false,
            generates_commission: true,
            student_due_date: date(2025, 3, 1),
            college_due_date: date(2025, 3, 15),
        },
    )
    .unwrap_err();
    assert_eq!(err.field(), Some("amount"));
}

#[test]
fn test_draft_installment_accepts_payment_only_after_activation() {
    let today = date(2025, 3, 2);
    let mut draft = installment(dec!(1000));
    draft.status = InstallmentStatus::Draft;

    assert_eq!(
        rejected_field(ledger().record_payment(&draft, &payment(dec!(1000)), today)),
        "status"
    );
    assert!(!InstallmentLedger::transition_to_overdue(&draft, today).is_applied());

    draft.activate().unwrap();
    let paid = ledger()
        .record_payment(&draft, &payment(dec!(1000)), today)
        .unwrap();
    assert_eq!(paid.previous.status, InstallmentStatus::Pending);
    assert_eq!(paid.current.status, InstallmentStatus::Paid);
}

#[test]
fn test_tolerance_boundary_is_inclusive() {
    let inst = installment(dec!(1000));
    let update = ledger()
        .record_payment(&inst, &payment(dec!(1100)), date(2025, 3, 1))
        .unwrap();
    assert_eq!(update.current.status, InstallmentStatus::Paid);
}

#[test]
fn test_notes_limit_counts_characters() {
    let inst = installment(dec!(1000));
    let notes = PaymentInput {
        notes: Some("é".repeat(500)),
        ..payment(dec!(100))
    };
    assert!(ledger().record_payment(&inst, &notes, date(2025, 3, 1)).is_ok());
}

#[test]
fn test_terminal_installments_reject_payment() {
    let today = date(2025, 3, 2);
    let paid = ledger()
        .record_payment(&installment(dec!(1000)), &payment(dec!(1000)), today)
        .unwrap()
        .current;
    assert_eq!(rejected_field(ledger().record_payment(&paid, &payment(dec!(10)), today)), "status");

    let mut cancelled = installment(dec!(1000));
    cancelled.cancel().unwrap();
    assert_eq!(
        rejected_field(ledger().record_payment(&cancelled, &payment(dec!(10)), today)),
        "status"
    );
}

#[test]
fn test_overdue_transition_twice_is_noop() {
    let as_of = date(2025, 3, 2);
    let first = match InstallmentLedger::transition_to_overdue(&installment(dec!(1000)), as_of) {
        OverdueTransition::Applied(update) => update,
        other => panic!("expected transition, got {:?}", other),
    };
    assert_eq!(first.current.status, InstallmentStatus::Overdue);
    assert_eq!(first.current.paid_amount, None);

    let second = InstallmentLedger::transition_to_overdue(&first.current, as_of);
    assert_eq!(
        second,
        OverdueTransition::NoOp(NoOpReason::NotPending(InstallmentStatus::Overdue))
    );
}

#[test]
fn test_overdue_requires_due_date_strictly_before() {
    let inst = installment(dec!(1000));
    let result = InstallmentLedger::transition_to_overdue(&inst, date(2025, 3, 1));
    assert!(!result.is_applied());
}

proptest! {
    #[test]
    fn prop_payment_fields_match_status(amount_cents in 1i64..=10_000_000i64, paid_cents in 1i64..=11_000_000i64) {
        let amount = Decimal::new(amount_cents, 2);
        let paid = Decimal::new(paid_cents, 2);
        let inst = installment(amount);

        match ledger().record_payment(&inst, &payment(paid), date(2025, 3, 1)) {
            Ok(update) => {
                prop_assert!(paid <= amount * dec!(1.10));
                let expected = if paid >= amount {
                    InstallmentStatus::Paid
                } else {
                    InstallmentStatus::Partial
                };
                prop_assert_eq!(update.current.status, expected);
                prop_assert!(update.current.check_payment_fields().is_ok());
                prop_assert_eq!(update.previous, inst);
            }
            Err(e) => {
                prop_assert!(paid > amount * dec!(1.10));
                prop_assert_eq!(e.field(), Some("paid_amount"));
            }
        }
    }
}
