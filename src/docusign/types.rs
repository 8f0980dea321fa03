/// DocuSign 信封数据结构
///
/// 只建模发送时需要的字段，响应体按原样转发，不做反序列化
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};

use crate::config::SignatureConfig;

/// 立即发送（草稿为 `created`）
pub const STATUS_SENT: &str = "sent";

const DOCUMENT_ID: &str = "1";
const RECIPIENT_ID: &str = "1";
const ROUTING_ORDER: &str = "1";
const SIGN_HERE_LABEL: &str = "SignHereTab";

/// 入站请求字段（JSON 或表单）
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendEnvelopeRequest {
    /// DocuSign Bearer Token
    pub auth: String,
    pub account_id: String,
    pub group_id: String,
    pub email_subject: String,
    pub email_content: String,
}

impl SendEnvelopeRequest {
    /// 检查必填字段非空
    pub fn validate(&self) -> Result<(), String> {
        let fields = [
            ("auth", &self.auth),
            ("accountId", &self.account_id),
            ("groupId", &self.group_id),
            ("emailSubject", &self.email_subject),
        ];

        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(format!("字段 {} 不能为空", name));
            }
        }

        // accountId 会被拼进 DocuSign 的 URL 路径
        let valid_account = self
            .account_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid_account {
            return Err(format!(
                "字段 accountId 只能包含字母、数字、'-' 与 '_': {:?}",
                self.account_id
            ));
        }
        Ok(())
    }
}

/// 构建一个信封所需的全部输入
#[derive(Debug, Clone)]
pub struct SignatureRequest {
    pub account_id: String,
    pub group_id: String,
    pub email_subject: String,
    pub email_content: String,
    pub document: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeDefinition {
    pub email_subject: String,
    pub email_blurb: String,
    pub documents: Vec<Document>,
    pub recipients: Recipients,
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub document_base64: String,
    pub file_extension: String,
    pub name: String,
    pub document_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipients {
    pub signers: Vec<Signer>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Signer {
    pub signing_group_id: String,
    pub routing_order: String,
    pub recipient_id: String,
    pub tabs: Tabs,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tabs {
    pub sign_here_tabs: Vec<SignHere>,
}

/// DocuSign 的数值字段都以字符串传输
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignHere {
    pub document_id: String,
    pub page_number: String,
    pub recipient_id: String,
    pub tab_label: String,
    pub x_position: String,
    pub y_position: String,
}

impl SignatureRequest {
    /// 构建信封：一个文档、一个签署组、一个签名框，状态为 `sent`
    pub fn to_envelope(&self, config: &SignatureConfig) -> EnvelopeDefinition {
        let placement = &config.sign_here;

        let sign_here = SignHere {
            document_id: DOCUMENT_ID.to_string(),
            page_number: placement.page.to_string(),
            recipient_id: RECIPIENT_ID.to_string(),
            tab_label: SIGN_HERE_LABEL.to_string(),
            x_position: placement.x.to_string(),
            y_position: placement.y.to_string(),
        };

        let signer = Signer {
            signing_group_id: self.group_id.clone(),
            routing_order: ROUTING_ORDER.to_string(),
            recipient_id: RECIPIENT_ID.to_string(),
            tabs: Tabs {
                sign_here_tabs: vec![sign_here],
            },
        };

        EnvelopeDefinition {
            email_subject: self.email_subject.clone(),
            email_blurb: self.email_content.clone(),
            documents: vec![Document {
                document_base64: BASE64.encode(&self.document),
                file_extension: "pdf".to_string(),
                name: config.document_name.clone(),
                document_id: DOCUMENT_ID.to_string(),
            }],
            recipients: Recipients {
                signers: vec![signer],
            },
            status: STATUS_SENT.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> SignatureRequest {
        SignatureRequest {
            account_id: "acc".to_string(),
            group_id: "grp".to_string(),
            email_subject: "Please sign".to_string(),
            email_content: "Thanks".to_string(),
            document: b"%PDF".to_vec(),
        }
    }

    #[test]
    fn test_envelope_json_shape() {
        let envelope = request().to_envelope(&SignatureConfig::default());
        let json = serde_json::to_value(&envelope).unwrap();

        assert_eq!(json["status"], "sent");
        assert_eq!(json["emailSubject"], "Please sign");
        assert_eq!(json["emailBlurb"], "Thanks");
        assert_eq!(json["documents"][0]["documentBase64"], "JVBERg==");
        assert_eq!(json["documents"][0]["fileExtension"], "pdf");
        assert_eq!(json["documents"][0]["name"], "Sample document");
        assert_eq!(json["documents"][0]["documentId"], "1");

        let signer = &json["recipients"]["signers"][0];
        assert_eq!(signer["signingGroupId"], "grp");
        assert_eq!(signer["routingOrder"], "1");

        let tab = &signer["tabs"]["signHereTabs"][0];
        assert_eq!(tab["tabLabel"], "SignHereTab");
        assert_eq!(tab["pageNumber"], "1");
        assert_eq!(tab["xPosition"], "195");
        assert_eq!(tab["yPosition"], "147");
    }

    #[test]
    fn test_request_parses_camel_case() {
        let req: SendEnvelopeRequest = serde_json::from_str(
            r#"{"auth": "t", "accountId": "a", "groupId": "g", "emailSubject": "s", "emailContent": "c"}"#,
        )
        .unwrap();
        assert_eq!(req.account_id, "a");
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_blank_fields() {
        let req = SendEnvelopeRequest {
            auth: " ".to_string(),
            account_id: "a".to_string(),
            group_id: "g".to_string(),
            email_subject: "s".to_string(),
            email_content: String::new(),
        };
        assert!(req.validate().unwrap_err().contains("auth"));
    }

    #[test]
    fn test_validate_rejects_account_id_with_path_characters() {
        for account_id in ["attacker/../victim", "..", "acc?x=1", "acc#frag", "a b"] {
            let req = SendEnvelopeRequest {
                auth: "t".to_string(),
                account_id: account_id.to_string(),
                group_id: "g".to_string(),
                email_subject: "s".to_string(),
                email_content: String::new(),
            };
            assert!(req.validate().unwrap_err().contains("accountId"), "{account_id}");
        }
    }
}
