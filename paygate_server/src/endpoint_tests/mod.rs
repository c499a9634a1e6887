mod cart;
mod helpers;
mod mocks;
mod payments;
mod webhooks;
