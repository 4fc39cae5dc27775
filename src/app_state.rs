use std::sync::Arc;
use crate::{
    auth::AuthService, config::Config, db::UserRepository, ledger::CardLedger, views::Views,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub users: Arc<dyn UserRepository>,
    pub auth: Arc<AuthService>,
    pub ledger: Arc<CardLedger>,
    pub views: Arc<Views>,
}
