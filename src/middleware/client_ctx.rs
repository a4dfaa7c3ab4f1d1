use crate::db::try_get_db_pool;
use crate::error::ServiceError;
use crate::orm::users;
use crate::rate_limit::check_api_rate_limit;
use crate::risk::ActingUser;
use crate::session::session_user_id;
use actix::fut::ready;
use actix_session::Session;
use actix_web::dev::{
    self, Extensions, Payload, Service, ServiceRequest, ServiceResponse, Transform,
};
use actix_web::{web::Data, Error, FromRequest, HttpMessage, HttpRequest};
use futures::future::{LocalBoxFuture, Ready};
use sea_orm::EntityTrait;
use std::rc::Rc;

/// Client data stored for a single request cycle.
#[derive(Clone, Debug, Default)]
pub struct ClientCtxInner {
    /// None is an anonymous caller.
    pub client: Option<users::Model>,
}

impl ClientCtxInner {
    pub async fn from_session(session: &Session) -> Self {
        let client = match (session_user_id(session), try_get_db_pool()) {
            (Some(user_id), Some(db)) => match users::Entity::find_by_id(user_id).one(db).await {
                Ok(user) => user,
                Err(e) => {
                    log::error!("Failed to load session user {}: {}", user_id, e);
                    None
                }
            },
            _ => None,
        };

        ClientCtxInner { client }
    }
}

/// Client context passed to routes.
/// Wraps ClientCtxInner, which is set at the beginning of the request.
#[derive(Clone, Debug)]
pub struct ClientCtx(Data<ClientCtxInner>);

impl Default for ClientCtx {
    fn default() -> Self {
        Self(Data::new(ClientCtxInner::default()))
    }
}

impl ClientCtx {
    pub fn from_user(user: users::Model) -> Self {
        Self(Data::new(ClientCtxInner { client: Some(user) }))
    }

    pub fn get_or_default_from_extensions(extensions: &mut Extensions) -> Self {
        match extensions.get::<Data<ClientCtxInner>>() {
            Some(cbox) => Self(cbox.clone()),
            None => {
                let cbox = Data::new(ClientCtxInner::default());
                extensions.insert(cbox.clone());
                Self(cbox)
            }
        }
    }

    pub fn get_id(&self) -> Option<i32> {
        self.0.client.as_ref().map(|u| u.id)
    }

    pub fn is_admin(&self) -> bool {
        self.0.client.as_ref().map_or(false, |u| u.is_admin())
    }

    /// Returns the user id or Unauthorized.
    pub fn require_login(&self) -> Result<i32, ServiceError> {
        self.get_id().ok_or(ServiceError::Unauthorized)
    }

    /// Returns the user id of an administrator, Unauthorized or Forbidden.
    pub fn require_admin(&self) -> Result<i32, ServiceError> {
        let id = self.require_login()?;
        if !self.is_admin() {
            return Err(ServiceError::Forbidden);
        }
        Ok(id)
    }

    /// The logged-in user as the lifecycle engine sees them.
    pub fn actor(&self) -> Result<ActingUser, ServiceError> {
        let id = self.require_login()?;
        Ok(ActingUser {
            id,
            is_admin: self.is_admin(),
        })
    }
}

/// Provides `client: ClientCtx` in the parameters of route functions.
impl FromRequest for ClientCtx {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(Ok(ClientCtx::get_or_default_from_extensions(
            &mut req.extensions_mut(),
        )))
    }
}

impl<S: 'static, B> Transform<S, ServiceRequest> for ClientCtx
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = ClientCtxMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(ClientCtxMiddleware {
            service: Rc::new(service),
        }))
    }
}

pub struct ClientCtxMiddleware<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for ClientCtxMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    dev::forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let svc = self.service.clone();

        // Session must be extracted from the split request before it is rebuilt.
        let (httpreq, payload) = req.into_parts();
        let session = Session::extract(&httpreq).into_inner();
        let ip = httpreq
            .connection_info()
            .realip_remote_addr()
            .unwrap_or("unknown")
            .to_owned();
        let req = ServiceRequest::from_parts(httpreq, payload);

        Box::pin(async move {
            match session {
                Ok(session) => {
                    let inner = ClientCtxInner::from_session(&session).await;

                    // Signed-in callers are counted per account, everyone else per address.
                    let key = match &inner.client {
                        Some(user) => format!("user:{}", user.id),
                        None => ip,
                    };
                    if let Err(e) = check_api_rate_limit(&key) {
                        log::warn!("API rate limit exceeded for {}", key);
                        return Err(ServiceError::from(e).into());
                    }

                    req.extensions_mut().insert(Data::new(inner));
                }
                Err(err) => {
                    log::error!("Unable to extract Session data in middleware: {}", err);
                }
            };

            svc.call(req).await
        })
    }
}
