// Installments module

pub mod controllers;
pub mod models;
pub mod repositories;
pub mod services;

pub use models::{Installment, InstallmentStatus, NewInstallment};
pub use repositories::{InstallmentRepository, MySqlInstallmentRepository};
pub use services::{InstallmentLedger, InstallmentUpdate, LedgerPolicy, PaymentInput};
