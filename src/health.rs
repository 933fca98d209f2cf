use crate::state::{AppMetrics, AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;
use std::process;

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let config = state.get_config();
    let uptime_seconds = state.get_uptime_seconds();

    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "service": {
            "name": "voice-turn-backend",
            "version": env!("CARGO_PKG_VERSION"),
            "host": config.server.host,
            "port": config.server.port
        },
        "metrics": {
            "active_sessions": metrics.active_sessions,
            "sessions_opened": metrics.sessions_opened,
            "turns_completed": metrics.turns_completed,
            "pipeline_errors": metrics.pipeline_errors
        },
        "memory": get_memory_info(),
        "providers": {
            "base_url": config.providers.base_url,
            "api_key_configured": config.has_api_key(),
            "transcription_model": config.providers.transcription_model,
            "chat_model": config.providers.chat_model,
            "speech_model": config.providers.speech_model,
            "voice": config.providers.voice
        },
        "system": get_system_status(config.performance.max_concurrent_sessions, &metrics)
    }))
}

pub async fn detailed_metrics(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let config = state.get_config();
    let uptime_seconds = state.get_uptime_seconds();

    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "sessions": {
            "active": metrics.active_sessions,
            "opened": metrics.sessions_opened,
            "rejected": metrics.sessions_rejected,
            "max_concurrent": config.performance.max_concurrent_sessions
        },
        "pipeline": {
            "turns_completed": metrics.turns_completed,
            "chunks_sent": metrics.chunks_sent,
            "synthesis_dropped": metrics.synthesis_dropped,
            "synthesis_drop_rate": metrics.synthesis_drop_rate(),
            "errors": metrics.pipeline_errors,
            "turns_per_minute": if uptime_seconds > 0 {
                metrics.turns_completed as f64 * 60.0 / uptime_seconds as f64
            } else {
                0.0
            }
        },
        "settings": {
            "synthesis_parallelism": config.pipeline.synthesis_parallelism,
            "synthesis_timeout_secs": config.pipeline.synthesis_timeout_secs,
            "max_sentence_chars": config.pipeline.max_sentence_chars
        },
        "memory": get_memory_info()
    }))
}

fn get_memory_info() -> serde_json::Value {
    #[cfg(target_os = "linux")]
    {
        let pid = process::id();
        if let Ok(status) = std::fs::read_to_string(format!("/proc/{}/status", pid)) {
            let mut vm_rss = 0;
            let mut vm_size = 0;

            for line in status.lines() {
                let kb = || {
                    line.split_whitespace()
                        .nth(1)
                        .and_then(|kb| kb.parse::<u64>().ok())
                        .unwrap_or(0)
                        * 1024
                };
                if line.starts_with("VmRSS:") {
                    vm_rss = kb();
                } else if line.starts_with("VmSize:") {
                    vm_size = kb();
                }
            }

            return json!({
                "resident_memory_bytes": vm_rss,
                "virtual_memory_bytes": vm_size,
                "available": true
            });
        }
    }

    json!({
        "resident_memory_bytes": 0,
        "virtual_memory_bytes": 0,
        "available": false,
        "note": "Memory info not available on this platform"
    })
}

fn get_system_status(max_sessions: usize, metrics: &AppMetrics) -> serde_json::Value {
    let session_usage = if max_sessions > 0 {
        metrics.active_sessions as f64 / max_sessions as f64
    } else {
        0.0
    };

    let status = if session_usage >= 1.0 {
        "full"
    } else if session_usage > 0.7 {
        "high_load"
    } else {
        "normal"
    };

    json!({
        "status": status,
        "session_usage_percent": (session_usage * 100.0).round(),
        "max_sessions": max_sessions,
        "current_sessions": metrics.active_sessions,
        "load_warnings": if session_usage > 0.8 {
            vec!["High session usage - consider increasing max_concurrent_sessions"]
        } else {
            vec![]
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support;
    use actix_web::{test as actix_test, App};

    #[actix_web::test]
    async fn test_health_reports_sessions() {
        let state = test_support::state();
        state.try_open_session(10);
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/health", web::get().to(health_check)),
        )
        .await;

        let req = actix_test::TestRequest::get().uri("/health").to_request();
        let body: serde_json::Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["metrics"]["active_sessions"], 1);
        assert_eq!(body["providers"]["api_key_configured"], false);
    }

    #[test]
    fn test_system_status_full() {
        let metrics = AppMetrics {
            active_sessions: 4,
            ..Default::default()
        };
        assert_eq!(get_system_status(4, &metrics)["status"], "full");
        assert_eq!(get_system_status(10, &metrics)["status"], "normal");
    }
}
