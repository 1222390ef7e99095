mod agency;

pub use agency::Agency;
