use rand::{distributions::Alphanumeric, Rng};

use crate::db_types::{PaymentReference, ProductType};

const REFERENCE_RANDOM_LEN: usize = 32;

/// Generates an unguessable payment reference, e.g. `AIR-3kq0...` for an airtime purchase.
pub fn new_payment_reference(product_type: ProductType) -> PaymentReference {
    let suffix: String =
        rand::thread_rng().sample_iter(&Alphanumeric).take(REFERENCE_RANDOM_LEN).map(char::from).collect();
    PaymentReference(format!("{}-{suffix}", product_type.reference_prefix()))
}
