//! This module provides reading from HTTP(S) endpoints that support byte-range
//! GET requests.
//!
//! Servers answer range requests with `206 Partial Content`, but some ignore
//! the `Range` header and return `200 OK` with the whole resource; both are
//! accepted, and in the `200` case the requested window is sliced out of the
//! full body. The total size is resolved once at open time via `HEAD`, falling
//! back to the `Content-Range` total of a one-byte ranged GET.

use super::DataSourceTrait;
use crate::{Blob, ByteRange};
use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::{Client, Method, Request, StatusCode, Url};
use std::time::Duration;

lazy_static! {
	static ref RE_CONTENT_RANGE: Regex = Regex::new(r"^bytes (\d+)-(\d+)/(\d+)$").unwrap();
}

/// A data source backed by an HTTP(S) resource supporting byte-range GET.
#[derive(Debug)]
pub struct DataSourceHttp {
	client: Client,
	name: String,
	url: Url,
	size: u64,
}

impl DataSourceHttp {
	/// Creates a `DataSourceHttp` from a URL, resolving the resource size.
	///
	/// # Errors
	/// Fails if the URL scheme is not http(s) or the size cannot be determined.
	pub async fn open(url: Url) -> Result<Box<DataSourceHttp>> {
		match url.scheme() {
			"http" | "https" => (),
			_ => bail!("url has wrong scheme {url}"),
		}

		let client = Client::builder()
			.tcp_keepalive(Duration::from_secs(600))
			.build()?;

		let size = Self::resolve_size(&client, &url)
			.await
			.with_context(|| format!("while resolving size of '{url}'"))?;

		Ok(Box::new(DataSourceHttp {
			client,
			name: url.to_string(),
			url,
			size,
		}))
	}

	async fn resolve_size(client: &Client, url: &Url) -> Result<u64> {
		let response = client.execute(Request::new(Method::HEAD, url.clone())).await?;
		if response.status().is_success() {
			if let Some(length) = response.content_length() {
				if length > 0 {
					return Ok(length);
				}
			}
		}

		// Some object stores refuse HEAD on pre-signed URLs; a one-byte range
		// GET reports the total length in its Content-Range header.
		let mut request = Request::new(Method::GET, url.clone());
		request.headers_mut().append("range", "bytes=0-0".parse()?);
		let response = client.execute(request).await?;
		let content_range = response
			.headers()
			.get("content-range")
			.ok_or_else(|| anyhow!("no content-length and no content-range for '{url}'"))?
			.to_str()?;
		let captures = RE_CONTENT_RANGE
			.captures(content_range)
			.ok_or_else(|| anyhow!("invalid content-range '{content_range}'"))?;
		Ok(captures.get(3).unwrap().as_str().parse::<u64>()?)
	}
}

#[async_trait]
impl DataSourceTrait for DataSourceHttp {
	async fn read_range(&self, range: &ByteRange) -> Result<Blob> {
		let mut request = Request::new(Method::GET, self.url.clone());
		let request_range = format!("bytes={}-{}", range.offset, range.end() - 1);
		request.headers_mut().append("range", request_range.parse()?);

		log::trace!("GET {} range {}", self.url, range);
		let response = self
			.client
			.execute(request)
			.await
			.with_context(|| format!("while requesting range {range} of '{}'", self.url))?;

		let status = response.status();
		let bytes = match status {
			StatusCode::PARTIAL_CONTENT => {
				let body = response.bytes().await?;
				if (body.len() as u64) < range.length {
					bail!(
						"short read: got {} of {} bytes for range {range} of '{}'",
						body.len(),
						range.length,
						self.url
					);
				}
				body[..range.length as usize].to_vec()
			}
			StatusCode::OK => {
				// Server ignored the range header and sent the whole resource.
				let body = response.bytes().await?;
				let r = range.as_range_usize();
				if body.len() < r.end {
					bail!(
						"server returned full body of {} bytes, too short for range {range} of '{}'",
						body.len(),
						self.url
					);
				}
				body[r].to_vec()
			}
			_ => bail!("unexpected status {status} for range request {range} to '{}'", self.url),
		};

		Ok(Blob::from(bytes))
	}

	fn size(&self) -> u64 {
		self.size
	}

	fn name(&self) -> &str {
		&self.name
	}
}
