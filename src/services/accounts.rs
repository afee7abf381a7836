use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::oneshot;

use super::ledger::Ledger;
use super::{RequestHandler, Service, ServiceError};
use crate::models::accounts::{Account, AccountPatch};
use crate::models::transactions::{Transaction, TransactionKind};

pub enum AccountRequest {
    Login {
        external_key: String,
        today: NaiveDate,
        response: oneshot::Sender<Result<Account, ServiceError>>,
    },
    GetAccount {
        external_key: String,
        response: oneshot::Sender<Result<Account, ServiceError>>,
    },
    ListAccounts {
        response: oneshot::Sender<Result<Vec<Account>, ServiceError>>,
    },
    AdjustBalance {
        external_key: String,
        amount_in_cents: i64,
        kind: Option<TransactionKind>,
        note: Option<String>,
        response: oneshot::Sender<Result<(Account, Transaction), ServiceError>>,
    },
    Patch {
        external_key: String,
        patch: AccountPatch,
        response: oneshot::Sender<Result<Account, ServiceError>>,
    },
}

#[derive(Clone)]
pub struct AccountRequestHandler {
    ledger: Ledger,
}

impl AccountRequestHandler {
    pub fn new(ledger: Ledger) -> Self {
        AccountRequestHandler { ledger }
    }
}

#[async_trait]
impl RequestHandler<AccountRequest> for AccountRequestHandler {
    async fn handle_request(&self, request: AccountRequest) {
        match request {
            AccountRequest::Login {
                external_key,
                today,
                response,
            } => {
                let account = self.ledger.login_or_create(&external_key, today).await;
                let _ = response.send(account);
            }
            AccountRequest::GetAccount {
                external_key,
                response,
            } => {
                let account = self.ledger.get_account(&external_key).await;
                let _ = response.send(account);
            }
            AccountRequest::ListAccounts { response } => {
                let accounts = self.ledger.list_accounts().await;
                let _ = response.send(accounts);
            }
            AccountRequest::AdjustBalance {
                external_key,
                amount_in_cents,
                kind,
                note,
                response,
            } => {
                let result = self
                    .ledger
                    .adjust_balance(&external_key, amount_in_cents, kind, note.as_deref())
                    .await;
                if let Err(e) = &result {
                    log::warn!("Adjustment on {} failed: {}", external_key, e);
                }
                let _ = response.send(result);
            }
            AccountRequest::Patch {
                external_key,
                patch,
                response,
            } => {
                let account = self.ledger.patch(&external_key, patch).await;
                let _ = response.send(account);
            }
        }
    }
}

pub struct AccountService;

impl AccountService {
    pub fn new() -> Self {
        AccountService {}
    }
}

#[async_trait]
impl Service<AccountRequest, AccountRequestHandler> for AccountService {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::test_pool;
    use tokio::sync::mpsc;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 17).unwrap()
    }

    async fn spawn_service() -> mpsc::Sender<AccountRequest> {
        let ledger = Ledger::new(test_pool().await);
        let (tx, mut rx) = mpsc::channel(16);
        tokio::spawn(async move {
            AccountService::new()
                .run(AccountRequestHandler::new(ledger), &mut rx)
                .await;
        });
        tx
    }

    #[tokio::test]
    async fn test_requests_round_trip_through_service() {
        let channel = spawn_service().await;

        let (response, rx) = oneshot::channel();
        channel
            .send(AccountRequest::Login {
                external_key: "9876543210".to_string(),
                today: today(),
                response,
            })
            .await
            .unwrap();
        let account = rx.await.unwrap().unwrap();

        let (response, rx) = oneshot::channel();
        channel
            .send(AccountRequest::AdjustBalance {
                external_key: account.external_key.clone(),
                amount_in_cents: 2_500,
                kind: None,
                note: Some("Goodwill".to_string()),
                response,
            })
            .await
            .unwrap();
        let (adjusted, transaction) = rx.await.unwrap().unwrap();
        assert_eq!(adjusted.balance_in_cents, 2_500);
        assert_eq!(transaction.details, "Goodwill");

        let (response, rx) = oneshot::channel();
        channel
            .send(AccountRequest::ListAccounts { response })
            .await
            .unwrap();
        assert_eq!(rx.await.unwrap().unwrap(), vec![adjusted]);
    }

    #[tokio::test]
    async fn test_unknown_account_is_not_found() {
        let channel = spawn_service().await;

        let (response, rx) = oneshot::channel();
        channel
            .send(AccountRequest::GetAccount {
                external_key: "missing".to_string(),
                response,
            })
            .await
            .unwrap();
        assert!(matches!(rx.await.unwrap(), Err(ServiceError::NotFound(_))));
    }
}
