mod references;
mod retry;

pub use references::new_payment_reference;
pub use retry::RetryPolicy;
