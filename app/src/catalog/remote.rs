use super::{Error, Product, ProductCatalog};
use crate::money::Cents;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use url::Url;

/// Reads products from an HTTP product API:
/// `GET {url}/products`, `GET {url}/products?search=q` and `GET {url}/products/{id}`.
pub struct RemoteCatalog {
    client: Client,
    url: Url,
    api_key: Option<String>,
}

impl RemoteCatalog {
    pub fn new(url: Url, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            url,
            api_key,
        }
    }

    fn products_url(&self) -> String {
        format!("{}/products", self.url.as_str().trim_end_matches('/'))
    }

    fn request(&self, url: &str) -> RequestBuilder {
        let request = self.client.get(url);
        match &self.api_key {
            Some(api_key) => request.header("x-api-key", api_key),
            None => request,
        }
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<Option<T>, Error> {
        let response = request
            .send()
            .await
            .map_err(|e| Error::Unavailable(e.to_string()))?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => response
                .json()
                .await
                .map(Some)
                .map_err(|e| Error::InvalidProduct(e.to_string())),
            status => Err(Error::Unavailable(format!("product API returned {}", status))),
        }
    }

    async fn fetch_list(&self, request: RequestBuilder) -> Result<Vec<Product>, Error> {
        self.fetch::<Vec<ProductDto>>(request)
            .await?
            .unwrap_or_default()
            .into_iter()
            .map(ProductDto::into_entity)
            .collect()
    }
}

#[async_trait]
impl ProductCatalog for RemoteCatalog {
    async fn get(&self, id: &str) -> Result<Product, Error> {
        let url = format!("{}/{}", self.products_url(), id);
        self.fetch::<ProductDto>(self.request(&url))
            .await?
            .ok_or_else(|| Error::NotFound(id.to_owned()))?
            .into_entity()
    }

    async fn list(&self) -> Result<Vec<Product>, Error> {
        self.fetch_list(self.request(&self.products_url())).await
    }

    async fn search(&self, query: &str) -> Result<Vec<Product>, Error> {
        let request = self
            .request(&self.products_url())
            .query(&[("search", query)]);
        let needle = query.to_lowercase();
        // The API may ignore the filter, so it is applied here as well.
        Ok(self
            .fetch_list(request)
            .await?
            .into_iter()
            .filter(|product| product.name.to_lowercase().contains(&needle))
            .collect())
    }

    async fn is_healthy(&self) -> bool {
        match self.request(&self.products_url()).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                log::warn!("product API returned {}", response.status());
                false
            }
            Err(e) => {
                log::warn!("product API is not reachable: {}", e);
                false
            }
        }
    }
}

/// Product ids are strings in our data, but some product APIs send them as numbers.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ProductIdDto {
    Text(String),
    Number(i64),
}

#[derive(Debug, Deserialize)]
struct ProductDto {
    id: ProductIdDto,
    name: String,
    price: f64,
    description: Option<String>,
    category: Option<String>,
}

impl ProductDto {
    fn into_entity(self) -> Result<Product, Error> {
        let id = match self.id {
            ProductIdDto::Text(id) => id,
            ProductIdDto::Number(id) => id.to_string(),
        };
        let price = Cents::from_f64(self.price)
            .map_err(|e| Error::InvalidProduct(format!("{}: {}", id, e)))?;
        if price.is_negative() {
            return Err(Error::InvalidProduct(format!("{}: negative price", id)));
        }
        Ok(Product {
            id,
            name: self.name,
            price,
            description: self.description,
            category: self.category,
        })
    }
}
