use anyhow::{Context, Result, bail};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::{Client, multipart::Form};
use serde_json::{Value, json};

const OPTIONS: [&str; 3] = ["Leftovers", "Takeout", "Cereal"];

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Server base URL, e.g. http://localhost:8080
    base_url: String,

    #[arg(long, default_value_t = 3)]
    posts: u32,

    #[arg(long, default_value = "tester")]
    client_id: String,
}

struct Seeder {
    client: Client,
    base: String,
    client_id: String,
}

impl Seeder {
    fn url(&self, path: &str) -> String {
        format!("{}/api/no-login{path}", self.base.trim_end_matches('/'))
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value> {
        let response = request.header("x-client-id", &self.client_id).send().await?;
        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);

        if !status.is_success() {
            bail!("{status}: {body}");
        }

        Ok(body)
    }

    async fn seed_post(&self, n: u32) -> Result<i64> {
        let options = serde_json::to_string(&OPTIONS)?;
        let form = Form::new()
            .text("title", format!("Fridge check #{n}"))
            .text("description", "What's for dinner tonight?")
            .text("author", "tester")
            .text("hasImage", "false")
            .text("hasPoll", "true")
            .text("pollQuestion", "Dinner plan?")
            .text("pollOptions", options);

        let post = self
            .send(self.client.post(self.url("/posts")).multipart(form))
            .await?;
        let post_id = post["id"].as_i64().context("post without id")?;

        for option in [0, 0, 1, 2, 0] {
            self.send(
                self.client
                    .post(self.url(&format!("/posts/{post_id}/polls")))
                    .json(&json!({ "optionIndex": option })),
            )
            .await?;
        }

        let top = self.reply(post_id, "First!", None).await?;
        let nested = self.reply(post_id, "Second, under first", Some(top)).await?;
        self.reply(post_id, "Third level", Some(nested)).await?;
        self.reply(post_id, "Another top-level", None).await?;

        self.send(
            self.client
                .post(self.url(&format!("/posts/{post_id}/reactions"))),
        )
        .await?;

        Ok(post_id)
    }

    async fn reply(&self, post_id: i64, content: &str, parent_id: Option<i64>) -> Result<i64> {
        let reply = self
            .send(
                self.client
                    .post(self.url(&format!("/posts/{post_id}/replies")))
                    .json(&json!({
                        "content": content,
                        "author": "tester",
                        "parent_id": parent_id,
                    })),
            )
            .await?;

        reply["id"].as_i64().context("reply without id")
    }
}

fn print_thread(nodes: &Value, depth: usize) {
    let Some(nodes) = nodes.as_array() else {
        return;
    };

    for node in nodes {
        println!(
            "{}- {} ({})",
            "  ".repeat(depth),
            node["content"].as_str().unwrap_or_default(),
            node["author"].as_str().unwrap_or_default()
        );
        print_thread(&node["children"], depth + 1);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let seeder = Seeder {
        client: Client::new(),
        base: args.base_url,
        client_id: args.client_id,
    };

    let pb = ProgressBar::new(args.posts as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
        )?
        .progress_chars("=> "),
    );

    let mut last_post = None;
    for n in 1..=args.posts {
        pb.set_message(format!("Seeding post {n}"));
        last_post = Some(seeder.seed_post(n).await?);
        pb.inc(1);
    }
    pb.finish_with_message("Done");

    let Some(post_id) = last_post else {
        println!("Nothing seeded.");
        return Ok(());
    };

    let poll = seeder
        .send(seeder.client.get(seeder.url(&format!("/posts/{post_id}/polls"))))
        .await?;
    println!("\nPoll for post {post_id}: {}", poll["question"]);
    println!("Counts: {}", poll["voteCounts"]);
    println!("Total: {}", poll["totalVotes"]);
    println!("Voted: {}\n", poll["hasVoted"]);

    let tree = seeder
        .send(
            seeder
                .client
                .get(seeder.url(&format!("/posts/{post_id}/replies/tree"))),
        )
        .await?;
    print_thread(&tree, 0);

    Ok(())
}
