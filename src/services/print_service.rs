use std::{io::Cursor, sync::Arc};

use ipp::{
    error::IppError,
    prelude::{
        AsyncIppClient, DelimiterTag, IppAttribute, IppOperationBuilder, IppPayload,
        IppRequestResponse, IppValue, Uri,
    },
};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::PrintConfig;

#[derive(Error, Debug)]
pub enum PrintError {
    #[error("failed to read print file: {0}")]
    Io(#[from] std::io::Error),

    #[error("print server request failed: {0}")]
    Ipp(#[from] IppError),

    #[error("invalid printer uri {uri}: {reason}")]
    InvalidUri { uri: String, reason: String },

    #[error("printer rejected the job with IPP status {0:#06x}")]
    Rejected(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrintResponse {
    pub status_code: u16,
    pub request_id: u32,
    pub job_id: Option<i32>,
}

impl PrintResponse {
    /// Status codes 0x0000-0x00FF are the successful-ok family.
    pub fn is_successful(&self) -> bool {
        self.status_code < 0x0100
    }

    fn from_ipp(response: &IppRequestResponse) -> Self {
        let job_id = response
            .attributes()
            .groups_of(DelimiterTag::JobAttributes)
            .find_map(|group| match group.attributes().get("job-id").map(|a| a.value()) {
                Some(IppValue::Integer(id)) => Some(*id),
                _ => None,
            });

        Self {
            status_code: response.header().operation_or_status,
            request_id: response.header().request_id,
            job_id,
        }
    }
}

/// Submits print jobs to a remote IPP print server.
pub struct PrintGateway {
    config: PrintConfig,
}

impl PrintGateway {
    pub fn new(config: PrintConfig) -> Result<Self, PrintError> {
        let gateway = Self { config };
        gateway.parse_printer_uri(gateway.default_printer())?;
        Ok(gateway)
    }

    pub fn default_printer(&self) -> &str {
        &self.config.printer
    }

    /// `ipps://` when TLS is on; the client maps it to `https://` on the wire.
    pub fn printer_uri(&self, printer: &str) -> String {
        let scheme = if self.config.use_tls { "ipps" } else { "ipp" };
        format!(
            "{scheme}://{}:{}/printers/{}",
            self.config.host, self.config.port, printer
        )
    }

    fn parse_printer_uri(&self, printer: &str) -> Result<Uri, PrintError> {
        let uri = self.printer_uri(printer);
        uri.parse().map_err(|e: <Uri as std::str::FromStr>::Err| PrintError::InvalidUri {
            uri: uri.clone(),
            reason: e.to_string(),
        })
    }

    fn client(&self, uri: Uri) -> AsyncIppClient {
        let builder = AsyncIppClient::builder(uri).request_timeout(self.config.timeout);
        match &self.config.username {
            Some(username) => builder
                .basic_auth(username, self.config.password.as_deref().unwrap_or_default())
                .build(),
            None => builder.build(),
        }
    }

    /// Reads a local file and submits it, letting the printer detect its format.
    #[cfg(test)]
    pub async fn print_file(
        &self,
        path: impl AsRef<std::path::Path>,
        printer: &str,
    ) -> Result<PrintResponse, PrintError> {
        let path = path.as_ref();
        let document = tokio::fs::read(path).await?;
        let job_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());

        self.print_document(printer, &job_name, "application/octet-stream", document)
            .await
    }

    pub async fn print_document(
        &self,
        printer: &str,
        job_name: &str,
        document_format: &str,
        document: Vec<u8>,
    ) -> Result<PrintResponse, PrintError> {
        let uri = self.parse_printer_uri(printer)?;
        let operation = IppOperationBuilder::print_job(uri.clone(), IppPayload::new(Cursor::new(document)))
            .user_name(self.config.username.as_deref().unwrap_or("anonymous"))
            .job_title(job_name)
            .attribute(IppAttribute::new(
                "document-format",
                IppValue::MimeMediaType(document_format.to_owned().into()),
            ))
            .build();

        let response = self.client(uri).send(operation).await?;
        let response = PrintResponse::from_ipp(&response);
        if !response.is_successful() {
            return Err(PrintError::Rejected(response.status_code));
        }
        Ok(response)
    }

    /// Fire-and-forget submission to the default printer. The outcome is only logged.
    pub fn dispatch(self: &Arc<Self>, job_name: String, document_format: &'static str, document: Vec<u8>) {
        let gateway = Arc::clone(self);
        tokio::spawn(async move {
            let printer = gateway.default_printer().to_string();
            match gateway
                .print_document(&printer, &job_name, document_format, document)
                .await
            {
                Ok(response) => info!(job_id = ?response.job_id, "Print job {job_name} accepted by {printer}"),
                Err(e) => warn!("Print job {job_name} failed: {e}"),
            }
        });
    }
}
