use async_trait::async_trait;
use tokio::sync::oneshot;

use super::approvals::ApprovalWorkflow;
use super::RequestHandler;
use super::Service;
use super::ServiceError;
use crate::models::accounts::Account;
use crate::models::transactions::{Decision, Transaction, TransactionFilter};

pub enum TransactionServiceRequest {
    SubmitDeposit {
        external_key: String,
        amount_in_cents: i64,
        reference: String,
        response: oneshot::Sender<Result<Transaction, ServiceError>>,
    },
    SubmitWithdrawal {
        external_key: String,
        amount_in_cents: i64,
        destination: String,
        response: oneshot::Sender<Result<(Account, Transaction), ServiceError>>,
    },
    Adjudicate {
        transaction_id: String,
        decision: Decision,
        note: Option<String>,
        response: oneshot::Sender<Result<Transaction, ServiceError>>,
    },
    Fail {
        transaction_id: String,
        note: Option<String>,
        response: oneshot::Sender<Result<Transaction, ServiceError>>,
    },
    ListTransactions {
        filter: TransactionFilter,
        response: oneshot::Sender<Result<Vec<Transaction>, ServiceError>>,
    },
}

#[derive(Clone)]
pub struct TransactionRequestHandler {
    workflow: ApprovalWorkflow,
}

impl TransactionRequestHandler {
    pub fn new(workflow: ApprovalWorkflow) -> Self {
        TransactionRequestHandler { workflow }
    }
}

#[async_trait]
impl RequestHandler<TransactionServiceRequest> for TransactionRequestHandler {
    async fn handle_request(&self, request: TransactionServiceRequest) {
        match request {
            TransactionServiceRequest::SubmitDeposit {
                external_key,
                amount_in_cents,
                reference,
                response,
            } => {
                let result = self
                    .workflow
                    .submit_deposit(&external_key, amount_in_cents, &reference)
                    .await;
                let _ = response.send(result);
            }
            TransactionServiceRequest::SubmitWithdrawal {
                external_key,
                amount_in_cents,
                destination,
                response,
            } => {
                let result = self
                    .workflow
                    .submit_withdrawal(&external_key, amount_in_cents, &destination)
                    .await;
                let _ = response.send(result);
            }
            TransactionServiceRequest::Adjudicate {
                transaction_id,
                decision,
                note,
                response,
            } => {
                let result = self
                    .workflow
                    .adjudicate(&transaction_id, decision, note.as_deref())
                    .await;
                let _ = response.send(result);
            }
            TransactionServiceRequest::Fail {
                transaction_id,
                note,
                response,
            } => {
                let result = self.workflow.fail(&transaction_id, note.as_deref()).await;
                let _ = response.send(result);
            }
            TransactionServiceRequest::ListTransactions { filter, response } => {
                let result = self.workflow.ledger().list_transactions(&filter).await;
                let _ = response.send(result);
            }
        }
    }
}

pub struct TransactionService;

impl TransactionService {
    pub fn new() -> Self {
        TransactionService {}
    }
}

#[async_trait]
impl Service<TransactionServiceRequest, TransactionRequestHandler> for TransactionService {}
