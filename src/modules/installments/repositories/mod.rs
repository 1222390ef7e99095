pub mod installment_repository;

pub use installment_repository::{
    CandidateRow, InstallmentRepository, MySqlInstallmentRepository, RowDecodeError,
};
