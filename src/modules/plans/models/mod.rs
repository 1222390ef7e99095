mod payment_plan;

pub use payment_plan::{NewPaymentPlan, PaymentPlan, PlanStatus};
