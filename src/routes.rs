use actix_web::{
    delete, get, http::StatusCode, patch, post, put, web, HttpRequest, HttpResponse, ResponseError,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::auth::{authenticate, Requester, TokenSigner};
use crate::error::ServiceError;
use crate::schemas::MemberId;
use crate::service::{
    Credentials, EqualSplitRequest, NewExpense, NewGroup, NewMember, Profile, Service,
};

#[derive(Serialize)]
struct ErrorResponse {
    timestamp: DateTime<Utc>,
    status: u16,
    error: &'static str,
    message: String,
}

impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_) | ServiceError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServiceError::Unauthorized => StatusCode::UNAUTHORIZED,
            ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::Integrity(_) | ServiceError::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        let error = match self {
            ServiceError::Validation(_) => "validation_error",
            ServiceError::BadRequest(_) => "bad_request",
            ServiceError::Unauthorized => "unauthorized",
            ServiceError::Forbidden(_) => "forbidden",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::Conflict(_) => "conflict",
            ServiceError::Integrity(_) => "integrity_error",
            ServiceError::Store(_) => "store_error",
        };
        HttpResponse::build(status).json(ErrorResponse {
            timestamp: Utc::now(),
            status: status.as_u16(),
            error,
            message: self.to_string(),
        })
    }
}

type Reply = Result<HttpResponse, ServiceError>;

fn requester(request: &HttpRequest, signer: &TokenSigner) -> Result<Requester, ServiceError> {
    authenticate(request, signer).ok_or(ServiceError::Unauthorized)
}

#[derive(Serialize)]
struct Session {
    member: Profile,
    token: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddMemberJson {
    member_id: MemberId,
}

#[put("/members/{id}")]
#[tracing::instrument(skip_all, fields(member = %id))]
async fn register_member(
    service: web::Data<Service>,
    signer: web::Data<TokenSigner>,
    id: web::Path<String>,
    json: web::Json<NewMember>,
) -> Reply {
    let member = service.register_member(id.into_inner(), json.into_inner()).await?;
    let token = signer.issue_token(&member.id);
    Ok(HttpResponse::Created().json(Session { member, token }))
}

#[post("/members/{id}/login")]
#[tracing::instrument(skip_all, fields(member = %id))]
async fn login(
    service: web::Data<Service>,
    signer: web::Data<TokenSigner>,
    id: web::Path<String>,
    json: web::Json<Credentials>,
) -> Reply {
    let member = service.login(&id, json.into_inner()).await?;
    let token = signer.issue_token(&member.id);
    Ok(HttpResponse::Ok().json(Session { member, token }))
}

#[get("/members/me")]
async fn current_member(
    service: web::Data<Service>,
    signer: web::Data<TokenSigner>,
    request: HttpRequest,
) -> Reply {
    let requester = requester(&request, &signer)?;
    Ok(HttpResponse::Ok().json(service.current_member(&requester).await?))
}

#[post("/groups")]
#[tracing::instrument(skip_all)]
async fn create_group(
    service: web::Data<Service>,
    signer: web::Data<TokenSigner>,
    request: HttpRequest,
    json: web::Json<NewGroup>,
) -> Reply {
    let requester = requester(&request, &signer)?;
    let group = service.create_group(&requester, json.into_inner()).await?;
    Ok(HttpResponse::Created().json(group))
}

#[get("/groups")]
async fn list_groups(
    service: web::Data<Service>,
    signer: web::Data<TokenSigner>,
    request: HttpRequest,
) -> Reply {
    let requester = requester(&request, &signer)?;
    Ok(HttpResponse::Ok().json(service.list_groups(&requester).await?))
}

#[get("/groups/{id}")]
async fn get_group(
    service: web::Data<Service>,
    signer: web::Data<TokenSigner>,
    request: HttpRequest,
    id: web::Path<String>,
) -> Reply {
    let requester = requester(&request, &signer)?;
    Ok(HttpResponse::Ok().json(service.get_group(&requester, &id).await?))
}

#[delete("/groups/{id}")]
#[tracing::instrument(skip_all, fields(group = %id))]
async fn delete_group(
    service: web::Data<Service>,
    signer: web::Data<TokenSigner>,
    request: HttpRequest,
    id: web::Path<String>,
) -> Reply {
    let requester = requester(&request, &signer)?;
    service.delete_group(&requester, &id).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[post("/groups/{id}/members")]
#[tracing::instrument(skip_all, fields(group = %id))]
async fn add_member(
    service: web::Data<Service>,
    signer: web::Data<TokenSigner>,
    request: HttpRequest,
    id: web::Path<String>,
    json: web::Json<AddMemberJson>,
) -> Reply {
    let requester = requester(&request, &signer)?;
    let group = service
        .add_member(&requester, &id, json.into_inner().member_id)
        .await?;
    Ok(HttpResponse::Ok().json(group))
}

#[delete("/groups/{id}/members/{member_id}")]
#[tracing::instrument(skip_all, fields(group = %path.0, member = %path.1))]
async fn remove_member(
    service: web::Data<Service>,
    signer: web::Data<TokenSigner>,
    request: HttpRequest,
    path: web::Path<(String, String)>,
) -> Reply {
    let requester = requester(&request, &signer)?;
    let (group_id, member_id) = path.into_inner();
    let group = service.remove_member(&requester, &group_id, &member_id).await?;
    Ok(HttpResponse::Ok().json(group))
}

#[post("/groups/{id}/expenses")]
#[tracing::instrument(skip_all, fields(group = %id))]
async fn add_expense(
    service: web::Data<Service>,
    signer: web::Data<TokenSigner>,
    request: HttpRequest,
    id: web::Path<String>,
    expense: web::Json<NewExpense>,
) -> Reply {
    let requester = requester(&request, &signer)?;
    let expense = service
        .create_expense(&requester, &id, expense.into_inner())
        .await?;
    Ok(HttpResponse::Created().json(expense))
}

#[get("/groups/{id}/expenses")]
async fn list_expenses(
    service: web::Data<Service>,
    signer: web::Data<TokenSigner>,
    request: HttpRequest,
    id: web::Path<String>,
) -> Reply {
    let requester = requester(&request, &signer)?;
    Ok(HttpResponse::Ok().json(service.list_expenses(&requester, &id).await?))
}

#[get("/groups/{id}/expenses/{expense_id}")]
async fn get_expense(
    service: web::Data<Service>,
    signer: web::Data<TokenSigner>,
    request: HttpRequest,
    path: web::Path<(String, String)>,
) -> Reply {
    let requester = requester(&request, &signer)?;
    let (group_id, expense_id) = path.into_inner();
    Ok(HttpResponse::Ok().json(service.get_expense(&requester, &group_id, &expense_id).await?))
}

#[patch("/groups/{id}/expenses/{expense_id}/splits/{member_id}/pay")]
#[tracing::instrument(skip_all, fields(group = %path.0, expense = %path.1, member = %path.2))]
async fn pay_split(
    service: web::Data<Service>,
    signer: web::Data<TokenSigner>,
    request: HttpRequest,
    path: web::Path<(String, String, String)>,
) -> Reply {
    let requester = requester(&request, &signer)?;
    let (group_id, expense_id, member_id) = path.into_inner();
    let split = service
        .mark_split_paid(&requester, &group_id, &expense_id, &member_id)
        .await?;
    Ok(HttpResponse::Ok().json(split))
}

#[post("/groups/{id}/splits/equal")]
async fn preview_equal_split(
    service: web::Data<Service>,
    signer: web::Data<TokenSigner>,
    request: HttpRequest,
    id: web::Path<String>,
    json: web::Json<EqualSplitRequest>,
) -> Reply {
    let requester = requester(&request, &signer)?;
    let shares = service
        .preview_equal_split(&requester, &id, json.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(shares))
}

#[get("/groups/{id}/balances")]
#[tracing::instrument(skip_all, fields(group = %id))]
async fn get_balances(
    service: web::Data<Service>,
    signer: web::Data<TokenSigner>,
    request: HttpRequest,
    id: web::Path<String>,
) -> Reply {
    let requester = requester(&request, &signer)?;
    Ok(HttpResponse::Ok().json(service.balances(&requester, &id).await?))
}

#[get("/groups/{id}/settlements")]
#[tracing::instrument(skip_all, fields(group = %id))]
async fn get_settlements(
    service: web::Data<Service>,
    signer: web::Data<TokenSigner>,
    request: HttpRequest,
    id: web::Path<String>,
) -> Reply {
    let requester = requester(&request, &signer)?;
    Ok(HttpResponse::Ok().json(service.settlements(&requester, &id).await?))
}

/// Registers every route plus a JSON extractor that reports malformed bodies
/// in the same error shape as the rest of the API.
pub fn configure(cfg: &mut web::ServiceConfig) {
    let json_config = web::JsonConfig::default()
        .error_handler(|err, _| ServiceError::bad_request(err.to_string()).into());
    cfg.app_data(json_config)
        .service(register_member)
        .service(login)
        .service(current_member)
        .service(create_group)
        .service(list_groups)
        .service(get_group)
        .service(delete_group)
        .service(add_member)
        .service(remove_member)
        .service(add_expense)
        .service(list_expenses)
        .service(get_expense)
        .service(pay_split)
        .service(preview_equal_split)
        .service(get_balances)
        .service(get_settlements);
}
