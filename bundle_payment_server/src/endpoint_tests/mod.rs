mod helpers;
mod mocks;
mod orders;
mod repairs;
mod webhooks;
