pub mod installment_ledger;

pub use installment_ledger::{
    InstallmentLedger, InstallmentUpdate, LedgerPolicy, NoOpReason, OverdueTransition,
    PaymentInput,
};
