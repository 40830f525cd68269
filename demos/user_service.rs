//! Binds a small service contract against the JSONPlaceholder API.
//!
//! Shows typed GET and POST calls through a service facade, query parameters,
//! a logging interceptor, rate limiting and error inspection.
//!
//! Run with: `cargo run --example user_service`

use restbind::{
    record, Argument, Client, Contract, Error, LoggingInterceptor, MethodDescriptor, ReturnShape,
    Service, ServiceHandler,
};
use std::sync::Arc;

#[derive(Debug, Default, Clone)]
struct Post {
    user_id: u32,
    id: u32,
    title: String,
    body: String,
}

record! {
    Post {
        user_id => "userId",
        id,
        title,
        body,
    }
}

struct Posts(Arc<ServiceHandler>);

impl Service for Posts {
    fn contract() -> Contract {
        Contract::builder("Posts")
            .method(
                "get",
                MethodDescriptor::get("/posts/{id}")
                    .path_param("id")
                    .header("Accept: application/json")
                    .returns(ReturnShape::typed::<Post>()),
            )
            .method(
                "by_user",
                MethodDescriptor::get("/posts")
                    .query_param("userId")
                    .returns(ReturnShape::typed::<Vec<Post>>()),
            )
            .method(
                "create",
                MethodDescriptor::post("/posts")
                    .body_param()
                    .returns(ReturnShape::typed::<Post>()),
            )
            .build()
    }

    fn bind(handler: Arc<ServiceHandler>) -> Self {
        Posts(handler)
    }
}

impl Posts {
    fn get(&self, id: u32) -> restbind::Result<Post> {
        self.0.call("get", vec![Argument::of(&id)])
    }

    fn by_user(&self, user_id: u32) -> restbind::Result<Vec<Post>> {
        self.0.call("by_user", vec![Argument::of(&user_id)])
    }

    fn create(&self, post: &Post) -> restbind::Result<Post> {
        self.0.call("create", vec![Argument::of(post)])
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("restbind=debug,user_service=info")
        .init();

    let client = Client::builder()
        .base_url("https://jsonplaceholder.typicode.com")?
        .max_retries(2)
        .rate_limit(60)?
        .response_interceptor(Arc::new(LoggingInterceptor::default()))
        .build()?;
    let posts = client.service::<Posts>();

    println!("=== GET ===");
    let post = posts.get(1)?;
    println!("Post {} by user {}: {}", post.id, post.user_id, post.title);
    println!();

    println!("=== Query parameters ===");
    let mine = posts.by_user(1)?;
    println!("User 1 has {} posts", mine.len());
    println!();

    println!("=== POST ===");
    let created = posts.create(&Post {
        user_id: 1,
        title: "My New Post".to_string(),
        body: "This is the content of my new post!".to_string(),
        ..Default::default()
    })?;
    println!("Created post ID: {}", created.id);
    println!();

    println!("=== Errors ===");
    match posts.get(999_999) {
        Ok(post) => println!("Unexpected success: {post:?}"),
        Err(e) => {
            println!("Status: {:?}", e.status());
            println!("Body: {:?}", e.raw_response());
            println!("Retryable: {}", e.last_error().is_retryable());
            if let Error::MaxRetriesExceeded { attempts, .. } = e {
                println!("Gave up after {attempts} attempts");
            }
        }
    }

    Ok(())
}
