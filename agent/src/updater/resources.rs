// File: agent/src/updater/resources.rs
//! Connection-oriented server resources: JDBC pools and data sources, JMS
//! connection factories and servers, JNDI bindings, shared libraries.

use super::{capitalize, Engine, RunContext, Scope};
use crate::controller::ResourceSpec;
use crate::errors::UpdateResult;
use crate::model::{
    JdbcConnectionPool, JdbcDataSource, JmsConnectionFactory, JmsServer, JndiBinding, Node,
    SharedLibrary,
};
use crate::types::ResourceKind;

pub(crate) trait ConnectionResource: Node {
    const KIND: ResourceKind;

    fn spec(&self) -> ResourceSpec;
}

macro_rules! connection_resource {
    ($ty:ident) => {
        impl ConnectionResource for $ty {
            const KIND: ResourceKind = ResourceKind::$ty;

            fn spec(&self) -> ResourceSpec {
                ResourceSpec::$ty(self.clone())
            }
        }
    };
}

connection_resource!(JdbcConnectionPool);
connection_resource!(JdbcDataSource);
connection_resource!(JmsConnectionFactory);
connection_resource!(JmsServer);
connection_resource!(JndiBinding);
connection_resource!(SharedLibrary);

impl Engine {
    /// Deploys the resource when absent, otherwise lets the controller
    /// reconcile declared and live configuration.
    pub(crate) async fn update_connection_resource<R: ConnectionResource + Sync>(
        &self,
        ctx: &RunContext,
        scope: &Scope<'_>,
        resource: &R,
    ) -> UpdateResult<()> {
        let kind = R::KIND;
        if self.skip_inactive(ctx, kind, resource) {
            return Ok(());
        }
        if let Some(agent) = self.remote_owner(resource, scope.agent) {
            let request = scope.request.clone().name(resource.name());
            return self.delegate_update(ctx, agent, kind, request).await;
        }

        let label = format!("{} {}", capitalize(kind.label()), resource.name());
        let controller = self.controller(scope)?;
        let spec = resource.spec();

        if !controller.is_deployed(&spec).await? {
            controller.deploy(&spec).await?;
            ctx.log.mark_updated();
            ctx.log.info(format!("{} deployed", label));
        } else if controller.update(&spec).await? {
            ctx.log.mark_updated();
            ctx.log.info(format!("{} updated", label));
        } else {
            ctx.log.info(format!("{} already up to date", label));
        }
        Ok(())
    }

    pub(crate) async fn check_connection_resource<R: ConnectionResource + Sync>(
        &self,
        ctx: &RunContext,
        scope: &Scope<'_>,
        resource: &R,
    ) -> UpdateResult<bool> {
        let kind = R::KIND;
        if !resource.active() {
            return Ok(true);
        }
        if let Some(agent) = self.remote_owner(resource, scope.agent) {
            let request = scope.request.clone().name(resource.name());
            return self.delegate_check(ctx, agent, kind, request).await;
        }

        let controller = self.controller(scope)?;
        let spec = resource.spec();
        Ok(controller.is_deployed(&spec).await? && controller.is_up_to_date(&spec).await?)
    }
}
