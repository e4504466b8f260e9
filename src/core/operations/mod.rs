pub mod intent;

pub use intent::{IntentCreator, PaymentForm};

#[cfg(test)]
mod tests;
