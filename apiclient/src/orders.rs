// SPDX-FileCopyrightText: 2026 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! API client implementation for order lifecycle actions and feedback

use gigcommon::{
    identifiers::{OrderId, UserId},
    order::{Feedback, OrderAction},
};
use serde::Serialize;
use tracing::debug;

use crate::{ApiClient, ApiError};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SpecialistRequest {
    specialist_id: UserId,
}

impl ApiClient {
    /// Performs a lifecycle action on an order.
    ///
    /// Actions are idempotent: repeating a successful action succeeds again without effect.
    pub async fn order_action(&self, order_id: OrderId, action: OrderAction) -> Result<(), ApiError> {
        debug!(%order_id, ?action, "order action");
        let mut request = self.post(&format!("orders/{order_id}/{}", action.endpoint()))?;
        if let Some(specialist_id) = action.specialist_id() {
            request = request.json(&SpecialistRequest { specialist_id });
        }
        Self::send_empty(request).await
    }

    pub async fn submit_feedback(&self, feedback: &Feedback) -> Result<(), ApiError> {
        debug!(order_id = %feedback.order_id, kind = ?feedback.kind, "submit feedback");
        let request = self
            .post(&format!("orders/{}/feedback", feedback.order_id))?
            .json(feedback);
        Self::send_empty(request).await
    }
}

#[cfg(test)]
mod test {
    use gigcommon::order::FeedbackKind;
    use mockito::Matcher;
    use serde_json::json;

    use crate::test_utils::client;

    use super::*;

    #[tokio::test]
    async fn choose_specialist() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/orders/70/choose")
            .match_body(Matcher::Json(json!({ "specialistId": 2 })))
            .with_status(204)
            .create_async()
            .await;

        client(&server)
            .order_action(
                OrderId::new(70),
                OrderAction::Choose {
                    specialist_id: UserId::new(2),
                },
            )
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn complete_order() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/orders/70/complete")
            .with_status(200)
            .create_async()
            .await;

        client(&server)
            .order_action(OrderId::new(70), OrderAction::Complete)
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn submit_feedback() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/orders/70/feedback")
            .match_body(Matcher::Json(json!({
                "orderId": 70,
                "rating": 4,
                "comment": "Quick and tidy",
                "type": "completion",
            })))
            .with_status(201)
            .create_async()
            .await;

        let feedback = Feedback {
            order_id: OrderId::new(70),
            rating: 4,
            comment: "Quick and tidy".to_owned(),
            kind: FeedbackKind::Completion,
        };
        client(&server).submit_feedback(&feedback).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/orders/71/cancel")
            .with_status(404)
            .create_async()
            .await;

        let error = client(&server)
            .order_action(OrderId::new(71), OrderAction::Cancel)
            .await
            .unwrap_err();
        assert!(matches!(error, ApiError::NotFound));
    }
}
