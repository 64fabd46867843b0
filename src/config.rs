//! Route specifications given on the command line
//!
//! A route is written `KEY=ITEM[,ITEM...]`. `KEY` is a host name or a path
//! pattern depending on where the route is registered. Items are applied in
//! the order written:
//!
//! - `scheme:https` proxies with the given scheme
//! - `host:backend.internal` proxies to the given host
//! - `port:8080` proxies to the given port
//! - `ports:8777/8778` proxies to the first port for plain requests and the
//!   second for TLS requests
//! - `insecure` skips certificate verification towards an https backend

use crate::director::{directors, to_host, to_port, to_ports, to_scheme, Director};
use crate::error::ConfigError;
use std::str::FromStr;

/// One rewrite step of a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectorSpec {
    Scheme(String),
    Host(String),
    Port(u16),
    Ports(u16, u16),
}

impl DirectorSpec {
    pub fn director(&self) -> Director {
        match self {
            DirectorSpec::Scheme(s) => to_scheme(s.clone()),
            DirectorSpec::Host(h) => to_host(h.clone()),
            DirectorSpec::Port(p) => to_port(*p),
            DirectorSpec::Ports(http, https) => to_ports(*http, *https),
        }
    }
}

/// A parsed route: the key it is registered under and how to rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSpec {
    pub key: String,
    pub steps: Vec<DirectorSpec>,
    pub insecure: bool,
}

impl RouteSpec {
    /// All steps chained into one director.
    pub fn director(&self) -> Director {
        directors(self.steps.iter().map(DirectorSpec::director))
    }
}

fn parse_port(s: &str) -> Result<u16, ConfigError> {
    s.trim()
        .parse()
        .map_err(|_| ConfigError::InvalidPort(s.to_string()))
}

impl FromStr for RouteSpec {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (key, items) = s
            .split_once('=')
            .ok_or_else(|| ConfigError::MissingSeparator(s.to_string()))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(ConfigError::EmptyKey(s.to_string()));
        }

        let mut route = RouteSpec {
            key: key.to_string(),
            steps: Vec::new(),
            insecure: false,
        };

        for item in items.split(',').map(str::trim).filter(|i| !i.is_empty()) {
            if item == "insecure" {
                route.insecure = true;
                continue;
            }

            let step = match item.split_once(':') {
                Some(("scheme", v)) if !v.is_empty() => DirectorSpec::Scheme(v.to_string()),
                Some(("host", v)) if !v.is_empty() => DirectorSpec::Host(v.to_string()),
                Some(("port", v)) => DirectorSpec::Port(parse_port(v)?),
                Some(("ports", v)) => {
                    let (http, https) = v
                        .split_once('/')
                        .ok_or_else(|| ConfigError::InvalidPort(v.to_string()))?;
                    DirectorSpec::Ports(parse_port(http)?, parse_port(https)?)
                }
                _ => return Err(ConfigError::UnknownItem(item.to_string())),
            };
            route.steps.push(step);
        }

        Ok(route)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::director::Target;

    #[test]
    fn test_parse_full_route() {
        let route: RouteSpec = "/=ports:8777/8778, host:app.internal ,insecure".parse().unwrap();
        assert_eq!(route.key, "/");
        assert!(route.insecure);
        assert_eq!(
            route.steps,
            vec![
                DirectorSpec::Ports(8777, 8778),
                DirectorSpec::Host("app.internal".to_string()),
            ]
        );
    }

    #[test]
    fn test_route_director_applies_in_order() {
        let route: RouteSpec = "localhost=host:crackerjack.local,port:8080,scheme:https"
            .parse()
            .unwrap();
        let mut target = Target::new("http", "localhost:5555", false);
        route.director().direct(&mut target);
        assert_eq!(target, Target::new("https", "crackerjack.local:8080", false));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            "localhost".parse::<RouteSpec>(),
            Err(ConfigError::MissingSeparator("localhost".to_string()))
        );
        assert_eq!(
            " =port:1".parse::<RouteSpec>(),
            Err(ConfigError::EmptyKey(" =port:1".to_string()))
        );
        assert_eq!(
            "a=path:/x".parse::<RouteSpec>(),
            Err(ConfigError::UnknownItem("path:/x".to_string()))
        );
        assert_eq!(
            "a=port:http".parse::<RouteSpec>(),
            Err(ConfigError::InvalidPort("http".to_string()))
        );
        assert_eq!(
            "a=ports:80".parse::<RouteSpec>(),
            Err(ConfigError::InvalidPort("80".to_string()))
        );
        assert_eq!(
            "a=port:70000".parse::<RouteSpec>(),
            Err(ConfigError::InvalidPort("70000".to_string()))
        );
    }

    #[test]
    fn test_empty_items_are_identity() {
        let route: RouteSpec = "a.local=".parse().unwrap();
        assert!(route.steps.is_empty());
        let mut target = Target::new("http", "a.local:1", false);
        route.director().direct(&mut target);
        assert_eq!(target.host, "a.local:1");
    }
}
