use chrono::{Datelike, Utc};

use crate::web::{auth::login_error_message, models::CollectionRow};

const SITE_NAME: &str = "BookCollect";

const BASE_STYLES: &str = r#"
        :root { color-scheme: light; --border: #e2e8f0; --accent: #1d4ed8; }
        body { font-family: "Helvetica Neue", Arial, sans-serif; margin: 0; background: #f8fafc; color: #0f172a; min-height: 100vh; display: flex; flex-direction: column; }
        header { background: #ffffff; border-bottom: 1px solid var(--border); padding: 1rem 1.5rem; }
        nav { display: flex; flex-wrap: wrap; gap: 1rem; align-items: center; max-width: 1100px; margin: 0 auto; }
        nav a { color: #0f172a; text-decoration: none; font-weight: 600; }
        nav a:hover { color: var(--accent); }
        nav .brand { font-size: 1.2rem; margin-right: auto; }
        nav form { margin: 0; }
        nav button { background: none; border: 1px solid var(--border); border-radius: 999px; padding: 0.35rem 0.9rem; cursor: pointer; font-weight: 600; }
        main { flex: 1; width: 100%; max-width: 1100px; margin: 0 auto; padding: 2rem 1.5rem; box-sizing: border-box; }
        .panel { background: #ffffff; border: 1px solid var(--border); border-radius: 12px; padding: 1.5rem; box-shadow: 0 18px 40px rgba(15, 23, 42, 0.06); }
        .grid { display: grid; gap: 1.5rem; grid-template-columns: repeat(auto-fill, minmax(240px, 1fr)); }
        .card { display: block; background: #ffffff; border: 1px solid var(--border); border-radius: 12px; overflow: hidden; text-decoration: none; color: inherit; }
        .card img { width: 100%; height: 320px; object-fit: cover; background: #f1f5f9; }
        .card .body { padding: 1rem; }
        .card h2 { margin: 0 0 0.4rem; font-size: 1.1rem; }
        .muted { color: #64748b; font-size: 0.92rem; }
        label { display: block; margin-top: 1rem; font-weight: 600; }
        input, textarea { width: 100%; padding: 0.7rem; margin-top: 0.4rem; border: 1px solid #cbd5e1; border-radius: 8px; box-sizing: border-box; font-size: 1rem; }
        .btn { display: inline-block; padding: 0.7rem 1.2rem; border: none; border-radius: 8px; background: var(--accent); color: #ffffff; font-weight: 600; cursor: pointer; text-decoration: none; }
        .btn-ghost { background: #e2e8f0; color: #0f172a; }
        .alert { display: none; margin-top: 1rem; padding: 0.8rem 1rem; border: 1px solid; border-radius: 8px; }
        .alert.error { display: block; border-color: #ef4444; background: #fef2f2; color: #b91c1c; }
        .alert.success { display: block; border-color: #22c55e; background: #f0fdf4; color: #166534; }
        table { width: 100%; border-collapse: collapse; margin-top: 1rem; }
        th, td { text-align: left; padding: 8px; border-top: 1px solid var(--border); }
        dialog { border: 1px solid var(--border); border-radius: 12px; width: min(560px, 92vw); }
        .app-footer { text-align: center; font-size: 0.85rem; color: #94a3b8; padding: 2rem 0; }
"#;

/// Per-request page data shared by every template.
pub struct PageContext {
    pub title: String,
    pub is_admin: bool,
    pub meta: Vec<(String, String)>,
}

impl PageContext {
    pub fn new(title: impl Into<String>, is_admin: bool) -> Self {
        Self {
            title: title.into(),
            is_admin,
            meta: Vec::new(),
        }
    }

    pub fn with_meta(mut self, name: &str, content: impl Into<String>) -> Self {
        self.meta.push((name.to_string(), content.into()));
        self
    }
}

pub fn render_page(page: &PageContext, body_html: &str, scripts: &str) -> String {
    let meta = page
        .meta
        .iter()
        .map(|(name, content)| {
            let attr = if name.starts_with("og:") { "property" } else { "name" };
            format!(
                r#"    <meta {attr}="{name}" content="{content}">"#,
                name = escape_html(name),
                content = escape_html(content),
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let admin_links = if page.is_admin {
        r#"<a href="/admin/panel/collections">Сборники (админ)</a>
            <a href="/admin/panel/articles">Заявки</a>
            <form method="post" action="/admin/logout"><button type="submit">Выйти</button></form>"#
    } else {
        r#"<a href="/admin/login">Вход</a>"#
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="ru">
<head>
    <meta charset="UTF-8">
    <title>{title} · {site}</title>
    <meta name="viewport" content="width=device-width, initial-scale=1">
{meta}
    <style>
{styles}
    </style>
</head>
<body>
    <header>
        <nav>
            <a class="brand" href="/">{site}</a>
            <a href="/collections">Сборники</a>
            <a href="/article">Подать статью</a>
            {admin_links}
        </nav>
    </header>
    <main>
{body_html}
    </main>
    {footer}
{scripts}
</body>
</html>"#,
        title = escape_html(&page.title),
        site = SITE_NAME,
        meta = meta,
        styles = BASE_STYLES,
        admin_links = admin_links,
        body_html = body_html,
        footer = render_footer(),
        scripts = scripts,
    )
}

pub fn render_footer() -> String {
    format!(
        r#"<footer class="app-footer">© {year} {site}</footer>"#,
        year = Utc::now().year(),
        site = SITE_NAME,
    )
}

pub fn render_index_page(page: &PageContext) -> String {
    let body = r#"        <section class="panel">
            <h1>Научные сборники</h1>
            <p class="muted">Архив выпусков и приём статей для публикации.</p>
            <p>
                <a class="btn" href="/collections">Все сборники</a>
                <a class="btn btn-ghost" href="/article">Подать статью</a>
            </p>
        </section>"#;
    render_page(page, body, "")
}

pub fn render_collections_page(page: &PageContext, collections: &[CollectionRow]) -> String {
    let cards = if collections.is_empty() {
        r#"<p class="muted">Сборников пока нет.</p>"#.to_string()
    } else {
        let items = collections
            .iter()
            .map(|collection| {
                let cover = collection
                    .cover_image
                    .as_deref()
                    .map(|src| format!(r#"<img src="{}" alt="">"#, escape_html(src)))
                    .unwrap_or_default();
                format!(
                    r#"<a class="card" href="/collections/{id}">{cover}<div class="body"><h2>{title}</h2><p class="muted">{release}</p></div></a>"#,
                    id = collection.id,
                    cover = cover,
                    title = escape_html(&collection.title),
                    release = escape_html(&release_label(collection)),
                )
            })
            .collect::<String>();
        format!(r#"<div class="grid">{items}</div>"#)
    };

    let body = format!(
        r#"        <h1>Все сборники</h1>
        {cards}"#
    );
    render_page(page, &body, "")
}

pub fn render_collection_page(page: &PageContext, collection: &CollectionRow) -> String {
    let cover = collection
        .cover_image
        .as_deref()
        .map(|src| {
            format!(
                r#"<img src="{}" alt="" style="max-width:280px; border-radius:12px; float:right; margin:0 0 1rem 1.5rem;">"#,
                escape_html(src)
            )
        })
        .unwrap_or_default();
    let description = collection
        .description
        .as_deref()
        .map(|text| format!("<p>{}</p>", escape_html(text).replace('\n', "<br>")))
        .unwrap_or_default();

    let mut links = Vec::new();
    if let Some(pdf) = collection.pdf_path.as_deref() {
        links.push(format!(
            r#"<a class="btn" href="{}" target="_blank" rel="noopener">Скачать PDF</a>"#,
            escape_html(pdf)
        ));
    }
    if let Some(link) = collection.publication_link.as_deref() {
        links.push(format!(
            r#"<a class="btn btn-ghost" href="{}" target="_blank" rel="noopener">Страница публикации</a>"#,
            escape_html(link)
        ));
    }

    let body = format!(
        r#"        <article class="panel">
            {cover}
            <h1>{title}</h1>
            <p class="muted">{release}</p>
            {description}
            <p>{links}</p>
        </article>"#,
        cover = cover,
        title = escape_html(&collection.title),
        release = escape_html(&release_label(collection)),
        description = description,
        links = links.join(" "),
    );
    render_page(page, &body, "")
}

pub fn render_not_found_page(page: &PageContext) -> String {
    let body = r#"        <section class="panel">
            <h1>Страница не найдена</h1>
            <p><a href="/collections">Вернуться к сборникам</a></p>
        </section>"#;
    render_page(page, body, "")
}

const ARTICLE_FORM_SCRIPT: &str = r#"<script>
const form = document.getElementById('articleForm');
const alertBox = document.getElementById('alert');
const submitBtn = document.getElementById('submitBtn');
form.addEventListener('submit', async (event) => {
    event.preventDefault();
    alertBox.className = 'alert';
    submitBtn.disabled = true;
    submitBtn.textContent = 'Отправка...';
    try {
        const res = await fetch(form.action, { method: 'POST', body: new FormData(form), credentials: 'same-origin' });
        const body = await res.json().catch(() => ({}));
        if (!res.ok) throw new Error(body.error || 'Ошибка отправки');
        alertBox.className = 'alert success';
        alertBox.textContent = body.msg || 'Заявка отправлена';
        form.reset();
    } catch (err) {
        alertBox.className = 'alert error';
        alertBox.textContent = err.message;
    } finally {
        submitBtn.disabled = false;
        submitBtn.textContent = 'Отправить';
    }
});
</script>"#;

pub fn render_article_form_page(page: &PageContext) -> String {
    let body = r#"        <section class="panel">
            <h1>Подать статью</h1>
            <p class="muted">Допустимые форматы: PDF, DOCX, ODT. Максимальный размер файла 25 МБ.</p>
            <form id="articleForm" method="post" action="/article" enctype="multipart/form-data">
                <label for="author">Автор</label>
                <input id="author" name="author" required>
                <label for="title">Название</label>
                <input id="title" name="title" required>
                <label for="email">Email</label>
                <input id="email" name="email" type="email" required>
                <label for="file">Файл рукописи</label>
                <input id="file" name="file" type="file" accept=".pdf,.docx,.odt" required>
                <p><button id="submitBtn" class="btn" type="submit">Отправить</button></p>
            </form>
            <div id="alert" class="alert"></div>
        </section>"#;
    render_page(page, body, ARTICLE_FORM_SCRIPT)
}

pub fn render_login_page(page: &PageContext, error_code: Option<&str>) -> String {
    let alert = error_code
        .map(|code| format!(r#"<div class="alert error">{}</div>"#, login_error_message(code)))
        .unwrap_or_default();

    let body = format!(
        r#"        <section class="panel" style="max-width:420px; margin:0 auto;">
            <h1>Вход администратора</h1>
            {alert}
            <form method="post" action="/admin/login">
                <label for="login">Логин</label>
                <input id="login" name="login" required>
                <label for="password">Пароль</label>
                <input id="password" name="password" type="password" required>
                <p><button class="btn" type="submit">Войти</button></p>
            </form>
        </section>"#
    );
    render_page(page, &body, "")
}

const ADMIN_SHARED_SCRIPT: &str = r#"<script>
function qs(s, r = document) { return r.querySelector(s); }
function escapeHtml(s) { return String(s ?? '').replace(/[&<>"']/g, m => ({ '&': '&amp;', '<': '&lt;', '>': '&gt;', '"': '&quot;', "'": '&#39;' }[m])); }
async function jsonFetch(url, opts = {}) {
    const res = await fetch(url, { credentials: 'same-origin', ...opts });
    const ct = res.headers.get('content-type') || '';
    const body = ct.includes('application/json') ? await res.json() : await res.text();
    if (!res.ok) throw new Error((body && body.error) ? body.error : (typeof body === 'string' ? body : 'Ошибка запроса'));
    return body;
}
</script>"#;

const ADMIN_COLLECTIONS_SCRIPT: &str = r#"<script>
(function () {
    const tbody = qs('#tbl tbody');
    const dlg = qs('#dlg');
    const frm = qs('#frm');
    const alertBox = qs('#alert');
    let items = [];

    async function load() {
        items = await jsonFetch('/api/collections');
        tbody.innerHTML = items.map(c => `<tr>
            <td>${c.id}</td>
            <td>${escapeHtml(c.title)}</td>
            <td>${c.release_year ?? ''}${c.release_number ? ' / № ' + c.release_number : ''}</td>
            <td><button class="btn btn-ghost" data-edit="${c.id}">Редактировать</button>
                <button class="btn btn-ghost" data-del="${c.id}">Удалить</button></td>
        </tr>`).join('');
    }

    qs('#btnNew').addEventListener('click', () => { frm.reset(); frm.elements.id.value = ''; alertBox.className = 'alert'; dlg.showModal(); });
    qs('#btnClose').addEventListener('click', () => dlg.close());

    tbody.addEventListener('click', async (e) => {
        const id = e.target.dataset.edit || e.target.dataset.del;
        if (!id) return;
        if (e.target.dataset.edit) {
            const item = items.find(x => String(x.id) === String(id));
            if (!item) return;
            frm.reset();
            for (const key of ['id', 'title', 'release_year', 'release_number', 'description', 'publication_link']) {
                frm.elements[key].value = item[key] ?? '';
            }
            alertBox.className = 'alert';
            dlg.showModal();
            return;
        }
        if (!confirm('Удалить сборник?')) return;
        try { await jsonFetch(`/admin/collection/${id}`, { method: 'DELETE' }); await load(); }
        catch (err) { alert(err.message); }
    });

    frm.addEventListener('submit', async (e) => {
        e.preventDefault();
        const id = frm.elements.id.value;
        try {
            if (id) {
                const item = items.find(x => String(x.id) === String(id)) || {};
                const num = v => v === '' ? null : Number(v);
                const payload = {
                    title: frm.elements.title.value,
                    release_year: num(frm.elements.release_year.value),
                    release_number: num(frm.elements.release_number.value),
                    description: frm.elements.description.value,
                    publication_link: frm.elements.publication_link.value,
                    cover_image: item.cover_image ?? null,
                    pdf_path: item.pdf_path ?? null,
                };
                await jsonFetch(`/admin/collection/${id}`, { method: 'PUT', headers: { 'Content-Type': 'application/json' }, body: JSON.stringify(payload) });
            } else {
                await jsonFetch('/admin/collection', { method: 'POST', body: new FormData(frm) });
            }
            dlg.close();
            await load();
        } catch (err) {
            alertBox.className = 'alert error';
            alertBox.textContent = err.message;
        }
    });

    load().catch(err => { tbody.innerHTML = `<tr><td colspan="4">${escapeHtml(err.message)}</td></tr>`; });
})();
</script>"#;

pub fn render_admin_collections_page(page: &PageContext) -> String {
    let body = r#"        <section class="panel">
            <h1>Сборники</h1>
            <button id="btnNew" class="btn" type="button">Новый сборник</button>
            <table id="tbl">
                <thead><tr><th>ID</th><th>Название</th><th>Год / номер</th><th></th></tr></thead>
                <tbody></tbody>
            </table>
        </section>
        <dialog id="dlg">
            <form id="frm" enctype="multipart/form-data">
                <input type="hidden" name="id">
                <label>Название <input name="title" required></label>
                <label>Год выпуска <input name="release_year" type="number"></label>
                <label>Номер выпуска <input name="release_number" type="number"></label>
                <label>Описание <textarea name="description" rows="4"></textarea></label>
                <label>Ссылка на публикацию <input name="publication_link"></label>
                <label>Обложка <input name="cover" type="file" accept="image/*"></label>
                <label>PDF <input name="pdf" type="file" accept=".pdf"></label>
                <div id="alert" class="alert"></div>
                <p><button class="btn" type="submit">Сохранить</button>
                   <button id="btnClose" class="btn btn-ghost" type="button">Закрыть</button></p>
            </form>
        </dialog>"#;
    let scripts = format!("{ADMIN_SHARED_SCRIPT}\n{ADMIN_COLLECTIONS_SCRIPT}");
    render_page(page, body, &scripts)
}

const ADMIN_ARTICLES_SCRIPT: &str = r#"<script>
(function () {
    const tbody = qs('#tbl tbody');
    async function load() {
        const items = await jsonFetch('/admin/articles');
        tbody.innerHTML = items.length ? items.map(a => `<tr>
            <td>${a.id}</td>
            <td>${escapeHtml(a.author)}</td>
            <td>${escapeHtml(a.title)}</td>
            <td><a href="mailto:${escapeHtml(a.email)}">${escapeHtml(a.email)}</a></td>
            <td>${a.created_at ? new Date(a.created_at).toLocaleString('ru-RU') : ''}</td>
            <td><a class="btn btn-ghost" href="/admin/articles/${a.id}/download">Скачать</a>
                <button class="btn btn-ghost" data-del="${a.id}">Удалить</button></td>
        </tr>`).join('') : '<tr><td colspan="6">Заявок пока нет.</td></tr>';
    }
    tbody.addEventListener('click', async (e) => {
        const id = e.target.dataset.del;
        if (!id || !confirm('Удалить заявку вместе с файлом?')) return;
        try { await jsonFetch(`/admin/articles/${id}`, { method: 'DELETE' }); await load(); }
        catch (err) { alert(err.message); }
    });
    load().catch(err => { tbody.innerHTML = `<tr><td colspan="6">${escapeHtml(err.message)}</td></tr>`; });
})();
</script>"#;

pub fn render_admin_articles_page(page: &PageContext) -> String {
    let body = r#"        <section class="panel">
            <h1>Заявки на публикацию</h1>
            <table id="tbl">
                <thead><tr><th>ID</th><th>Автор</th><th>Название</th><th>Email</th><th>Получено</th><th></th></tr></thead>
                <tbody></tbody>
            </table>
        </section>"#;
    let scripts = format!("{ADMIN_SHARED_SCRIPT}\n{ADMIN_ARTICLES_SCRIPT}");
    render_page(page, body, &scripts)
}

fn release_label(collection: &CollectionRow) -> String {
    match (collection.release_year, collection.release_number) {
        (Some(year), Some(number)) => format!("{year} · № {number}"),
        (Some(year), None) => year.to_string(),
        (None, Some(number)) => format!("№ {number}"),
        (None, None) => String::new(),
    }
}

/// First `max_chars` characters of `text`, never splitting a character.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

pub fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
