mod groups;
mod helpers;
mod postgres_store;
mod subscriptions;
mod subscriptions_confirm;
