use crate::config::AppConfig;
use crate::{error::AppError, state::AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;

/// Public view of the configuration. The provider key is reported only as present/absent.
fn config_view(config: &AppConfig) -> serde_json::Value {
    json!({
        "server": {
            "host": config.server.host,
            "port": config.server.port
        },
        "providers": {
            "base_url": config.providers.base_url,
            "api_key_configured": config.has_api_key(),
            "transcription_model": config.providers.transcription_model,
            "chat_model": config.providers.chat_model,
            "speech_model": config.providers.speech_model,
            "voice": config.providers.voice,
            "speech_format": config.providers.speech_format,
            "request_timeout_secs": config.providers.request_timeout_secs
        },
        "pipeline": {
            "system_prompt": config.pipeline.system_prompt,
            "max_sentence_chars": config.pipeline.max_sentence_chars,
            "synthesis_parallelism": config.pipeline.synthesis_parallelism,
            "synthesis_timeout_secs": config.pipeline.synthesis_timeout_secs
        },
        "performance": {
            "max_concurrent_sessions": config.performance.max_concurrent_sessions,
            "client_timeout_secs": config.performance.client_timeout_secs
        }
    })
}

pub async fn get_config(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let config = state.get_config();

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "config": config_view(&config)
    })))
}

/// Partially update the runtime configuration.
///
/// Pipeline settings apply to sessions opened after the update. Provider
/// settings belong to the shared client built at startup and are refused.
pub async fn update_config(
    state: web::Data<AppState>,
    body: web::Json<serde_json::Value>,
) -> Result<HttpResponse, AppError> {
    let json_str = serde_json::to_string(&body.into_inner())?;

    let mut current_config = state.get_config();
    current_config
        .update_from_json(&json_str)
        .map_err(|e| AppError::ValidationError(e.to_string()))?;

    state
        .update_config(current_config.clone())
        .map_err(AppError::ValidationError)?;

    tracing::info!("Configuration updated via API");

    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "message": "Configuration updated successfully",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "updated_config": config_view(&current_config)
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support;
    use actix_web::{http::StatusCode, test, App};

    #[actix_web::test]
    async fn test_config_never_exposes_key() {
        let state = test_support::state();
        {
            let mut config = state.config.write().unwrap();
            config.providers.api_key = "sk-secret".to_string();
        }
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/config", web::get().to(get_config)),
        )
        .await;

        let req = test::TestRequest::get().uri("/config").to_request();
        let body = test::call_and_read_body(&app, req).await;
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(!text.contains("sk-secret"));
        assert!(text.contains("\"api_key_configured\":true"));
    }

    #[actix_web::test]
    async fn test_update_config() {
        let state = test_support::state();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .route("/config", web::put().to(update_config)),
        )
        .await;

        let req = test::TestRequest::put()
            .uri("/config")
            .set_json(json!({"pipeline": {"synthesis_parallelism": 4}}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(state.get_config().pipeline.synthesis_parallelism, 4);

        let req = test::TestRequest::put()
            .uri("/config")
            .set_json(json!({"pipeline": {"max_sentence_chars": 0}}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(state.get_config().pipeline.max_sentence_chars, 200);
    }

    #[actix_web::test]
    async fn test_update_refuses_provider_settings() {
        let state = test_support::state();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .route("/config", web::put().to(update_config)),
        )
        .await;

        let req = test::TestRequest::put()
            .uri("/config")
            .set_json(json!({"providers": {"voice": "nova"}}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(state.get_config().providers.voice, "alloy");
    }
}
