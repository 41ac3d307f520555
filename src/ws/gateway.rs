use std::str::FromStr;

use snafu::prelude::*;

/// Error when parse a str to [`GatewayUrl`]
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(error), context(suffix(false)))]
pub enum ParseGatewayURLError {
    #[snafu(display("{s} is an invalid url: {source}"))]
    /// the str is not a valid url
    InvalidURL {
        /// string be parsed
        s: String,
        /// source error
        source: url::ParseError,
    },

    /// the parsed url schema is not websocket
    #[snafu(display("the url {s} has invalid schema {schema}, only ws or wss is ok"))]
    InvalidSchema {
        /// the url
        s: String,
        /// invalid schema
        schema: String,
    },

    /// the parsed url has no host
    #[snafu(display("the gateway url {s} has no host"))]
    NoHost {
        /// the url
        s: String,
    },
}

/// Gateway endpoint, a websocket url plus the compress flag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayUrl {
    base: url::Url,
    /// enable server->client frame compress
    pub compress: bool,
}

impl GatewayUrl {
    /// construct final url
    pub fn url(&self) -> url::Url {
        let mut u = self.base.clone();
        u.query_pairs_mut()
            .append_pair("compress", if self.compress { "1" } else { "0" });
        u
    }

    /// gateway host
    pub fn host(&self) -> &str {
        self.base.host_str().unwrap_or_default()
    }
}

impl FromStr for GatewayUrl {
    type Err = ParseGatewayURLError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut url = url::Url::parse(s).context(error::InvalidURL { s })?;

        ensure!(
            url.scheme() == "wss" || url.scheme() == "ws",
            error::InvalidSchema {
                s,
                schema: url.scheme(),
            }
        );

        ensure!(url.host().is_some(), error::NoHost { s });

        let mut compress = false;
        let rest = url
            .query_pairs()
            .filter(|(k, v)| {
                if k == "compress" {
                    compress = v == "1";
                    false
                } else {
                    true
                }
            })
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect::<Vec<_>>();

        url.set_query(None);
        if !rest.is_empty() {
            url.query_pairs_mut().extend_pairs(rest);
        }

        Ok(Self {
            base: url,
            compress,
        })
    }
}
