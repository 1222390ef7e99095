pub mod models;
pub mod repositories;

pub use models::Agency;
pub use repositories::{AgencyRepository, MySqlAgencyRepository};
