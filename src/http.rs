#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

use actix_web::http::StatusCode;
use actix_web::{get, post, web, App, HttpResponse, HttpServer};
use serde_json::json;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::bounds::{HostBounds, SystemInfo};
use crate::config::AgentConfig;
use crate::domain::{
    AppState, CpuLoadRequest, DynamicCpuLoadRequest, DynamicMemoryLoadRequest,
    MemoryLoadRequest, TerminateRequest,
};
use crate::error::AgentError;
use crate::logs::{LogFormat, LogOutcome, LogRequest};
use crate::probes::{Probe, ProbeRequest, ProbeStatus};

#[get("/")]
pub async fn pod_info(data: web::Data<AppState>) -> HttpResponse {
    let probes = data.probes.statuses();
    HttpResponse::Ok().json(json!({
        "pod_info": data.pod,
        "readiness_status": probes.readiness_status,
        "liveness_status": probes.liveness_status,
    }))
}

#[get("/healthz")]
pub async fn healthz() -> HttpResponse {
    HttpResponse::Ok().json(json!({"status":"ok"}))
}

#[get("/system")]
pub async fn system_info() -> HttpResponse {
    HttpResponse::Ok().json(SystemInfo::collect())
}

#[post("/terminate")]
pub async fn terminate(
    payload: Option<web::Json<TerminateRequest>>,
    data: web::Data<AppState>,
) -> HttpResponse {
    let seconds = payload.map(|p| p.into_inner().seconds).unwrap_or_default();
    warn!(seconds, "termination requested");
    let shutdown = data.shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(seconds)).await;
        shutdown.notify_one();
    });
    ok(&format!("Application will terminate in {seconds} seconds."))
}

#[get("/load")]
pub async fn load_status(data: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(data.load.status().await)
}

#[post("/load/cpu/start")]
pub async fn start_cpu(
    payload: web::Json<CpuLoadRequest>,
    data: web::Data<AppState>,
) -> HttpResponse {
    let req = payload.into_inner();
    info!(value = req.value, "cpu load request");
    match data.load.add_cpu_load(req.value).await {
        Ok(v) => ok(&format!("CPU load added: {v} CPUs")),
        Err(e) => error_response(&e),
    }
}

#[post("/load/cpu/stop")]
pub async fn stop_cpu(data: web::Data<AppState>) -> HttpResponse {
    match data.load.stop_cpu_load().await {
        Ok(()) => ok("CPU load stopped"),
        Err(e) => error_response(&e),
    }
}

#[post("/load/cpu/dynamic")]
pub async fn dynamic_cpu(
    payload: web::Json<DynamicCpuLoadRequest>,
    data: web::Data<AppState>,
) -> HttpResponse {
    let req = payload.into_inner();
    match data
        .load
        .dynamic_cpu_load(req.start_value, req.end_value, req.duration, req.stop_at_end)
        .await
    {
        Ok(accepted) => HttpResponse::Ok().json(json!({
            "status": "ok",
            "message": format!(
                "Progressive CPU load started: {}-{} over {} seconds.",
                req.start_value, req.end_value, req.duration
            ),
            "ramp": accepted,
        })),
        Err(e) => error_response(&e),
    }
}

#[post("/load/memory/start")]
pub async fn start_memory(
    payload: web::Json<MemoryLoadRequest>,
    data: web::Data<AppState>,
) -> HttpResponse {
    let req = payload.into_inner();
    info!(value = req.value, "memory load request");
    match data.load.add_memory_load(req.value).await {
        Ok(v) => ok(&format!("Memory load added: {v} MB")),
        Err(e) => error_response(&e),
    }
}

#[post("/load/memory/stop")]
pub async fn stop_memory(data: web::Data<AppState>) -> HttpResponse {
    match data.load.stop_memory_load().await {
        Ok(()) => ok("Memory load stopped"),
        Err(e) => error_response(&e),
    }
}

#[post("/load/memory/dynamic")]
pub async fn dynamic_memory(
    payload: web::Json<DynamicMemoryLoadRequest>,
    data: web::Data<AppState>,
) -> HttpResponse {
    let req = payload.into_inner();
    match data
        .load
        .dynamic_memory_load(req.start_value, req.end_value, req.duration, req.stop_at_end)
        .await
    {
        Ok(accepted) => HttpResponse::Ok().json(json!({
            "status": "ok",
            "message": format!(
                "Progressive memory load started: {}-{} over {} seconds.",
                req.start_value, req.end_value, req.duration
            ),
            "ramp": accepted,
        })),
        Err(e) => error_response(&e),
    }
}

#[get("/probes")]
pub async fn probe_statuses(data: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(data.probes.statuses())
}

#[get("/probes/readiness")]
pub async fn readiness(data: web::Data<AppState>) -> HttpResponse {
    probe_response(data.probes.get(Probe::Readiness))
}

#[get("/probes/liveness")]
pub async fn liveness(data: web::Data<AppState>) -> HttpResponse {
    probe_response(data.probes.get(Probe::Liveness))
}

#[post("/probes/status")]
pub async fn set_probe(
    payload: web::Json<ProbeRequest>,
    data: web::Data<AppState>,
) -> HttpResponse {
    let req = payload.into_inner();
    data.probes.set(req.probe, req.status);
    info!(probe = ?req.probe, status = %req.status, "probe status changed");
    ok(&format!(
        "{} set to {}",
        match req.probe {
            Probe::Readiness => "readiness",
            Probe::Liveness => "liveness",
        },
        req.status
    ))
}

#[post("/log")]
pub async fn create_log(
    payload: web::Json<LogRequest>,
    data: web::Data<AppState>,
) -> HttpResponse {
    match data.logs.emit(payload.into_inner()) {
        Ok(LogOutcome::Written {
            record,
            line,
            format,
        }) => match format {
            LogFormat::Json => HttpResponse::Ok().json(record),
            LogFormat::Plaintext => HttpResponse::Ok().content_type("text/plain").body(line),
        },
        Ok(LogOutcome::Scheduled { interval, duration }) => HttpResponse::Accepted().json(json!({
            "status": "ok",
            "message": "Recurring log creation started",
            "interval": interval,
            "duration": duration,
        })),
        Err(e) => error_response(&e),
    }
}

#[get("/metrics")]
pub async fn scrape_metrics(data: web::Data<AppState>) -> HttpResponse {
    match data.metrics.encode_text() {
        Ok(buf) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(buf),
        Err(e) => {
            error!(error=%format!("{e:#}"), "encode metrics failed");
            HttpResponse::InternalServerError().body("encode metrics failed")
        }
    }
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(pod_info)
        .service(healthz)
        .service(system_info)
        .service(terminate)
        .service(load_status)
        .service(start_cpu)
        .service(stop_cpu)
        .service(dynamic_cpu)
        .service(start_memory)
        .service(stop_memory)
        .service(dynamic_memory)
        .service(probe_statuses)
        .service(readiness)
        .service(liveness)
        .service(set_probe)
        .service(create_log)
        .service(scrape_metrics);
}

/// Runs the agent until the server exits or a termination request fires, then tears down all workers.
pub async fn serve(config: AgentConfig) -> std::io::Result<()> {
    let bounds = HostBounds::detect();
    info!(
        cpu_count = bounds.cpu_count,
        total_memory_mb = bounds.total_memory_mb,
        "host bounds"
    );
    let state = AppState::new(&config, bounds)
        .map_err(|e| std::io::Error::other(format!("state init: {e:#}")))?;
    state.load.bootstrap(&config).await;

    let app_state = state.clone();
    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .configure(routes)
    })
    .bind(config.bind_address.as_str())?
    .run();
    let handle = server.handle();

    let shutdown = state.shutdown.clone();
    tokio::spawn(async move {
        shutdown.notified().await;
        info!("termination delay elapsed, stopping server");
        handle.stop(true).await;
    });

    let result = server.await;
    state.load.shutdown().await;
    result
}

fn ok(message: &str) -> HttpResponse {
    HttpResponse::Ok().json(json!({"status":"ok","message":message}))
}

/// Validation failures are the caller's, anything else is a server error.
pub fn error_response(e: &AgentError) -> HttpResponse {
    let code = if e.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    if code.is_server_error() {
        error!(error = %e, "load operation failed");
    }
    json_error(code, &e.to_string())
}

fn probe_response(status: ProbeStatus) -> HttpResponse {
    match status {
        ProbeStatus::Ok => HttpResponse::Ok().json(status),
        ProbeStatus::Error => HttpResponse::ServiceUnavailable().json(status),
    }
}

fn json_error(code: StatusCode, reason: &str) -> HttpResponse {
    HttpResponse::build(code).json(json!({"status":"error","reason":reason}))
}
