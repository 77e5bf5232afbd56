use std::{
    collections::HashMap,
    io::Result,
    sync::{Mutex, MutexGuard, PoisonError},
};

use actix_cors::Cors;
use actix_files::Files;
use actix_multipart::Multipart;
use actix_web::{
    guard::{self, GuardContext},
    http::header::CONTENT_TYPE,
    middleware::Logger,
    web::{self, resource, Data, Json, JsonConfig, ServiceConfig},
    App, HttpResponse, HttpServer,
};
use serde_json::{Map, Value};
use tracing::info;

use crate::{
    core::{
        data::Store,
        settings::Settings,
        upload::{UploadPolicy, PUBLIC_PREFIX},
    },
    error::ApiError,
    types::{fields_from_json, Message, Project, Property, Record},
};

pub type SharedStore<R> = Mutex<Store<R>>;

/// Everything the handlers share across workers.
#[derive(Clone)]
pub struct AppState {
    properties: Data<SharedStore<Property>>,
    projects: Data<SharedStore<Project>>,
    uploads: Data<UploadPolicy>,
}

impl AppState {
    pub fn load(settings: &Settings) -> Self {
        AppState {
            properties: Data::new(Mutex::new(Store::load(&settings.properties_path))),
            projects: Data::new(Mutex::new(Store::load(&settings.projects_path))),
            uploads: Data::new(UploadPolicy::from(settings)),
        }
    }

    pub fn configure(&self, cfg: &mut ServiceConfig) {
        cfg.app_data(self.properties.clone())
            .app_data(self.projects.clone())
            .app_data(self.uploads.clone())
            .app_data(
                JsonConfig::default().error_handler(|error, _req| ApiError::from(error).into()),
            );
        register::<Property>(cfg);
        register::<Project>(cfg);
        cfg.service(Files::new(PUBLIC_PREFIX, self.uploads.dir.clone()));
    }
}

fn register<R: Record>(cfg: &mut ServiceConfig) {
    cfg.service(
        resource(R::ROUTE)
            .route(web::get().to(get_handler::<R>))
            .route(
                web::post()
                    .guard(guard::fn_guard(is_json))
                    .to(create_json_handler::<R>),
            )
            .route(web::post().to(create_handler::<R>)),
    )
    .service(resource(format!("{}/{{id}}", R::ROUTE)).route(web::delete().to(del_handler::<R>)));
}

pub async fn start_server(settings: Settings) -> Result<()> {
    let state = AppState::load(&settings);
    let addr = settings.addr();

    let server = HttpServer::new(move || {
        let state = state.clone();
        App::new()
            .configure(move |cfg| state.configure(cfg))
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allow_any_header()
                    .allow_any_method(),
            )
            .wrap(Logger::default())
    })
    .bind(addr)?;
    info!("Server running at http://localhost:{}", settings.port);
    server.run().await
}

fn is_json(ctx: &GuardContext<'_>) -> bool {
    ctx.head()
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim_start().to_ascii_lowercase().starts_with("application/json"))
        .unwrap_or(false)
}

/// Reads the leading integer of a path segment: optional sign, then decimal
/// digits or `0x` hex digits. Trailing text is ignored.
fn parse_id(raw: &str) -> Option<u64> {
    let raw = raw.trim_start();
    let (negative, rest) = match raw.as_bytes().first() {
        Some(b'-') => (true, &raw[1..]),
        Some(b'+') => (false, &raw[1..]),
        _ => (false, raw),
    };
    let (radix, rest) = match rest.get(..2) {
        Some("0x") | Some("0X") => (16, &rest[2..]),
        _ => (10, rest),
    };
    let end = rest
        .find(|c: char| !c.is_digit(radix))
        .unwrap_or(rest.len());
    let value = u64::from_str_radix(&rest[..end], radix).ok()?;
    match (negative, value) {
        (true, 0) => Some(0),
        (true, _) => None,
        (false, value) => Some(value),
    }
}

fn lock<R>(store: &SharedStore<R>) -> MutexGuard<'_, Store<R>> {
    store.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn get_handler<R: Record>(store: Data<SharedStore<R>>) -> HttpResponse {
    HttpResponse::Ok().json(lock(store.get_ref()).list())
}

async fn create_handler<R: Record>(
    store: Data<SharedStore<R>>,
    uploads: Data<UploadPolicy>,
    payload: Multipart,
) -> std::result::Result<HttpResponse, ApiError> {
    let mut form = uploads.read_form(payload).await?;
    let image = form.image_path();
    Ok(insert_record::<R>(store.get_ref(), &mut form.fields, image))
}

async fn create_json_handler<R: Record>(
    store: Data<SharedStore<R>>,
    body: Json<Map<String, Value>>,
) -> HttpResponse {
    let mut fields = fields_from_json(body.into_inner());
    insert_record::<R>(store.get_ref(), &mut fields, String::new())
}

fn insert_record<R: Record>(
    store: &SharedStore<R>,
    fields: &mut HashMap<String, String>,
    image: String,
) -> HttpResponse {
    let mut records = lock(store);
    let record = R::from_form(records.next_id(), fields, image);
    records.append(record.clone());
    info!(collection = R::LABEL, id = record.id(), "created record");

    HttpResponse::Created().json(record)
}

async fn del_handler<R: Record>(
    store: Data<SharedStore<R>>,
    uploads: Data<UploadPolicy>,
    id: web::Path<String>,
) -> std::result::Result<HttpResponse, ApiError> {
    let id = parse_id(&id).ok_or(ApiError::NotFound(R::LABEL))?;

    let mut records = lock(store.get_ref());
    let image = records
        .find(id)
        .map(|record| record.image().to_owned())
        .ok_or(ApiError::NotFound(R::LABEL))?;
    uploads.remove(&image);
    records.remove_by_id(id);
    info!(collection = R::LABEL, id, "deleted record");

    Ok(HttpResponse::Ok().json(Message::new(format!("{} deleted successfully", R::LABEL))))
}
