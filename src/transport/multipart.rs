use rand::Rng;

/// A `multipart/form-data` body with a single file part.
pub struct MultipartFile {
    boundary: String,
    body: Vec<u8>,
}

impl MultipartFile {
    pub fn new(field: &str, file_name: &str, content_type: &str, data: &[u8]) -> Self {
        let token: u128 = rand::thread_rng().gen();
        let boundary = format!("----kiosk{:032x}", token);

        let mut body = Vec::with_capacity(data.len() + 256);
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                field, file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

        Self { boundary, body }
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }
}
