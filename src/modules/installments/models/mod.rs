mod installment;

pub use installment::{Installment, InstallmentStatus, NewInstallment};
