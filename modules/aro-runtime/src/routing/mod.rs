//! Contract-first HTTP routing.
//!
//! An OpenAPI contract is compiled once into a route table in document
//! order. Matching returns the first route that fits, so a literal path such
//! as `/users/me` must be declared before `/users/{id}` to be reachable.

mod contract;
mod http;
mod template;

use std::collections::BTreeMap;

pub use contract::{
    Contract, ContractError, ContractOperation, ContractProblem, Operation, Parameter,
    ParameterLocation, PathItem, RequestBody,
};
pub use http::{parse_query, HttpRequest, HttpResponse};
pub use template::{PathTemplate, Segment, TemplateError};

#[derive(Debug, Clone)]
pub struct Route {
    pub method: &'static str,
    pub template: PathTemplate,
    pub operation_id: String,
    pub parameters: Vec<Parameter>,
    pub body_required: bool,
}

impl Route {
    fn from_operation(op: ContractOperation) -> Self {
        Self {
            method: op.method,
            template: op.template,
            operation_id: op.operation_id,
            parameters: op.parameters,
            body_required: op.body_required,
        }
    }

    /// Required query parameters missing from `query`.
    pub fn missing_query(&self, query: &BTreeMap<String, String>) -> Vec<String> {
        self.parameters
            .iter()
            .filter(|p| p.location == ParameterLocation::Query && p.required)
            .filter(|p| !query.contains_key(&p.name))
            .map(|p| p.name.clone())
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct RouteMatch<'a> {
    pub operation_id: &'a str,
    pub params: BTreeMap<String, String>,
    pub route: &'a Route,
}

#[derive(Debug, Clone, Default)]
pub struct OpenApiRouteRegistry {
    routes: Vec<Route>,
}

impl OpenApiRouteRegistry {
    pub fn compile(contract: &Contract) -> Result<Self, ContractError> {
        let routes = contract
            .operations()?
            .into_iter()
            .map(Route::from_operation)
            .collect();
        Ok(Self { routes })
    }

    /// First route whose method and template fit the request.
    pub fn match_route(&self, method: &str, path: &str) -> Option<RouteMatch<'_>> {
        self.routes
            .iter()
            .filter(|r| r.method.eq_ignore_ascii_case(method))
            .find_map(|route| {
                route.template.match_path(path).map(|params| RouteMatch {
                    operation_id: &route.operation_id,
                    params,
                    route,
                })
            })
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn operation_ids(&self) -> impl Iterator<Item = &str> {
        self.routes.iter().map(|r| r.operation_id.as_str())
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> OpenApiRouteRegistry {
        let contract = Contract::from_json(
            r#"{
                "paths": {
                    "/users/{id}": {
                        "get": { "operationId": "getUser" },
                        "delete": { "operationId": "deleteUser" }
                    },
                    "/users/me": { "get": { "operationId": "getMe" } },
                    "/users": {
                        "get": {
                            "operationId": "listUsers",
                            "parameters": [{ "name": "page", "in": "query", "required": true }]
                        }
                    }
                }
            }"#,
        )
        .unwrap();
        OpenApiRouteRegistry::compile(&contract).unwrap()
    }

    #[test]
    fn first_declared_route_wins() {
        let registry = registry();
        let shadowed = registry.match_route("GET", "/users/me").unwrap();
        assert_eq!(shadowed.operation_id, "getUser");
        assert_eq!(shadowed.params["id"], "me");

        let user = registry.match_route("get", "/users/42").unwrap();
        assert_eq!(user.operation_id, "getUser");
        assert_eq!(user.params["id"], "42");
    }

    #[test]
    fn literal_routes_declared_first_are_reachable() {
        let contract = Contract::from_json(
            r#"{
                "paths": {
                    "/users/me": { "get": { "operationId": "getMe" } },
                    "/users/{id}": { "get": { "operationId": "getUser" } }
                }
            }"#,
        )
        .unwrap();
        let registry = OpenApiRouteRegistry::compile(&contract).unwrap();
        let ids: Vec<&str> = registry.operation_ids().collect();
        assert_eq!(ids, vec!["getMe", "getUser"]);

        let me = registry.match_route("GET", "/users/me").unwrap();
        assert_eq!(me.operation_id, "getMe");
        assert!(me.params.is_empty());
        assert_eq!(
            registry.match_route("GET", "/users/7").unwrap().operation_id,
            "getUser"
        );
    }

    #[test]
    fn method_must_match() {
        let registry = registry();
        assert_eq!(
            registry.match_route("DELETE", "/users/7").unwrap().operation_id,
            "deleteUser"
        );
        assert!(registry.match_route("POST", "/users/7").is_none());
        assert!(registry.match_route("GET", "/accounts").is_none());
    }

    #[test]
    fn required_query_parameters_are_reported() {
        let registry = registry();
        let route = registry.match_route("GET", "/users").unwrap().route;
        assert_eq!(route.missing_query(&BTreeMap::new()), vec!["page"]);
        assert!(route.missing_query(&parse_query("page=2")).is_empty());
    }
}
