//! OpenAPI document for the operator REST surface.

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use super::dto::{
    CommandLogDto, CommandLogResponse, CommandResultResponse, FlashCommandRequest,
    HubDetailResponse, HubInfo, HubListResponse, PortListResponse, RestartCommandRequest,
    TelemetryRecordDto, TelemetryResponse, TelemetryStatsDto, WriteCommandRequest,
};
use super::handlers::{commands, hubs, system};
use crate::domain::{PortEventKind, PortInfo};
use crate::error::{ErrorBody, ErrorResponse};

/// Generated OpenAPI specification.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "hub-gateway",
        description = "Session registry, command correlation and telemetry for IoT hubs."
    ),
    paths(
        system::health_handler,
        system::banner_handler,
        hubs::list_hubs,
        hubs::get_hub,
        hubs::get_ports,
        hubs::get_telemetry,
        commands::write_command,
        commands::flash_command,
        commands::restart_command,
        commands::list_commands,
        commands::get_command,
    ),
    components(schemas(
        HubInfo,
        HubListResponse,
        HubDetailResponse,
        PortInfo,
        PortEventKind,
        PortListResponse,
        TelemetryStatsDto,
        TelemetryRecordDto,
        TelemetryResponse,
        WriteCommandRequest,
        FlashCommandRequest,
        RestartCommandRequest,
        CommandResultResponse,
        CommandLogDto,
        CommandLogResponse,
        ErrorResponse,
        ErrorBody,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "System", description = "Health and service information"),
        (name = "Hubs", description = "Connected hubs and their telemetry"),
        (name = "Commands", description = "Command dispatch and command log"),
    )
)]
pub struct ApiDoc;

/// Registers the `bearer` security scheme referenced by the operator paths.
#[derive(Debug)]
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}
