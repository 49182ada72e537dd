use crate::Bot;
use db::Store;
use ed25519_dalek::{Signature, VerifyingKey};
use http_body_util::{BodyExt, Full};
use hyper::{
    body::{Body, Bytes},
    header::{HeaderValue, CONTENT_TYPE},
    Method, Request, Response, StatusCode,
};

/// Checks Discord's Ed25519 signature over `timestamp || body`.
pub fn verify(key: &VerifyingKey, signature: &str, timestamp: &str, body: &[u8]) -> Result<(), StatusCode> {
    let mut bytes = [0; Signature::BYTE_SIZE];
    hex::decode_to_slice(signature, &mut bytes).map_err(|_| StatusCode::BAD_REQUEST)?;
    let signature = Signature::from_bytes(&bytes);

    let mut message = Vec::with_capacity(timestamp.len() + body.len());
    message.extend_from_slice(timestamp.as_bytes());
    message.extend_from_slice(body);

    key.verify_strict(&message, &signature).map_err(|_| StatusCode::UNAUTHORIZED)
}

pub async fn try_respond<B, S>(
    req: Request<B>,
    bot: &Bot<S>,
    key: &VerifyingKey,
) -> Result<Response<Full<Bytes>>, StatusCode>
where
    B: Body,
    S: Store,
{
    // For now, we only allow requests from the root endpoint.
    if req.method() != Method::POST || req.uri().path() != "/" {
        return Err(StatusCode::NOT_FOUND);
    }

    // Retrieve security headers
    let (parts, body) = req.into_parts();
    let maybe_sig = parts.headers.get("X-Signature-Ed25519").and_then(|val| val.to_str().ok());
    let maybe_time = parts.headers.get("X-Signature-Timestamp").and_then(|val| val.to_str().ok());
    let (sig, timestamp) = maybe_sig.zip(maybe_time).ok_or(StatusCode::BAD_REQUEST)?;

    // Validate the challenge
    let payload = body.collect().await.map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?.to_bytes();
    verify(key, sig, timestamp, &payload)?;

    // Parse incoming interaction
    let interaction = serde_json::from_slice(&payload).map_err(|_| StatusCode::BAD_REQUEST)?;
    drop(payload);

    // Construct new body
    let reply = bot.on_interaction(interaction).await;
    let bytes = serde_json::to_vec(&reply).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let mut res = Response::new(Full::new(Bytes::from(bytes)));
    assert!(res.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("application/json")).is_none());
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::{try_respond, verify};
    use crate::Bot;
    use db::memory::Memory;
    use ed25519_dalek::{Signer, SigningKey};
    use http_body_util::{BodyExt, Full};
    use hyper::{body::Bytes, Method, Request, StatusCode};

    const PING: &str = r#"{"id":"1","application_id":"2","type":1,"token":"abc","authorizing_integration_owners":{}}"#;

    fn signing_key() -> SigningKey {
        SigningKey::from_bytes(&[7; 32])
    }

    fn sign(key: &SigningKey, timestamp: &str, body: &str) -> String {
        let message = [timestamp.as_bytes(), body.as_bytes()].concat();
        hex::encode(key.sign(&message).to_bytes())
    }

    fn request(method: Method, path: &str, signature: Option<&str>, body: &str) -> Request<Full<Bytes>> {
        let mut builder = Request::builder().method(method).uri(path).header("X-Signature-Timestamp", "1700000000");
        if let Some(signature) = signature {
            builder = builder.header("X-Signature-Ed25519", signature);
        }
        builder.body(Full::new(Bytes::from(body.to_owned()))).unwrap()
    }

    #[test]
    fn signatures() {
        let key = signing_key();
        let public = key.verifying_key();
        let signature = sign(&key, "123", "{}");
        assert_eq!(verify(&public, &signature, "123", b"{}"), Ok(()));
        assert_eq!(verify(&public, &signature, "124", b"{}"), Err(StatusCode::UNAUTHORIZED));
        assert_eq!(verify(&public, &signature, "123", b"{ }"), Err(StatusCode::UNAUTHORIZED));
        assert_eq!(verify(&public, "zz", "123", b"{}"), Err(StatusCode::BAD_REQUEST));
        assert_eq!(verify(&public, &signature[2..], "123", b"{}"), Err(StatusCode::BAD_REQUEST));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn signed_ping() {
        let key = signing_key();
        let bot = Bot::new(Memory::default(), model::TTL);
        let signature = sign(&key, "1700000000", PING);

        let res = try_respond(request(Method::POST, "/", Some(&signature), PING), &bot, &key.verifying_key())
            .await
            .unwrap();
        assert_eq!(res.headers()["Content-Type"], "application/json");

        let body = res.into_body().collect().await.unwrap().to_bytes();
        let reply: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(reply["type"], 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn rejected_requests() {
        let key = signing_key();
        let public = key.verifying_key();
        let bot = Bot::new(Memory::default(), model::TTL);
        let signature = sign(&key, "1700000000", PING);

        let status = |res: Result<_, StatusCode>| res.err();
        let req = request(Method::GET, "/", Some(&signature), PING);
        assert_eq!(status(try_respond(req, &bot, &public).await), Some(StatusCode::NOT_FOUND));

        let req = request(Method::POST, "/other", Some(&signature), PING);
        assert_eq!(status(try_respond(req, &bot, &public).await), Some(StatusCode::NOT_FOUND));

        let req = request(Method::POST, "/", None, PING);
        assert_eq!(status(try_respond(req, &bot, &public).await), Some(StatusCode::BAD_REQUEST));

        let forged = sign(&SigningKey::from_bytes(&[8; 32]), "1700000000", PING);
        let req = request(Method::POST, "/", Some(&forged), PING);
        assert_eq!(status(try_respond(req, &bot, &public).await), Some(StatusCode::UNAUTHORIZED));

        let garbage = "not json";
        let signature = sign(&key, "1700000000", garbage);
        let req = request(Method::POST, "/", Some(&signature), garbage);
        assert_eq!(status(try_respond(req, &bot, &public).await), Some(StatusCode::BAD_REQUEST));
    }
}
